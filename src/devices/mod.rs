pub mod ads1115;
pub mod soil_probe;

pub use ads1115::Ads1115;
pub use soil_probe::SoilProbe;
