pub mod pool;
pub mod rls;

pub use pool::build_pool;
pub use rls::{ensure_role, APP_RLS_ROLE};
