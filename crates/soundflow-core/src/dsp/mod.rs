//! DSP pipeline: FFT stage and the perceptually scaled spectrum

pub mod fft;
pub mod spectrum;

pub use fft::FftStage;
pub use spectrum::{ScaledSpectrum, BASE_FREQ_HZ};
