pub mod new;
pub mod status;
pub mod sync;
