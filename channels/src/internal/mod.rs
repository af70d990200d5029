pub(crate) mod waiter;

pub(crate) use waiter::{WaiterKey, WaiterQueue};
