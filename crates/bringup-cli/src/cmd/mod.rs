pub mod describe;
pub mod launch;
