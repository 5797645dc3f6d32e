pub mod audit;
pub mod facility;
pub mod lead;
pub mod pool;
pub mod user;
