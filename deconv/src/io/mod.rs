//! On-disk output formats.

pub mod fits;

pub use fits::{read_fits_volume, write_psf_bank, FitsError, FitsVolumeWriter, DATA_HDU};
