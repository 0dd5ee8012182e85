pub mod check;
pub mod exec;
pub mod serve;
pub mod status;
