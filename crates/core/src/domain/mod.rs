pub mod attribution;
pub mod deal;
pub mod partner;
pub mod touchpoint;
