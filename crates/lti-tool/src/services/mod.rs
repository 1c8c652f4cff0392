pub mod ags;
pub mod nrps;
pub mod token;
