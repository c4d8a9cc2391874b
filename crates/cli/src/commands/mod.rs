pub mod make;
pub mod migrate;
pub mod output;
