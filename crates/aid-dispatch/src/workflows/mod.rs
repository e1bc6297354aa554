pub mod distribution;
pub mod intake;
