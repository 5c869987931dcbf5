pub mod generate;
pub mod quiz;
pub mod serve;
pub mod stats;
