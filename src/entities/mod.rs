pub mod local_state;
pub mod session;
