pub mod serve;
pub mod shovel;
pub mod version;
