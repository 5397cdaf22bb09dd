pub mod clock;
pub mod lock;
pub mod wakeup;
