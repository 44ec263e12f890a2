/// Kernel initialization and bootstrap module
pub mod init;
pub mod status;

pub use init::init_kernel;
pub use status::{
    all_components_ready, get_all_statuses, BootError, ComponentStatus, InitStatus,
};
