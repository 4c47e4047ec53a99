//! Integer-only NTSC composite video signal encoding / decoding emulation.
//!
//! The pipeline takes a raster RGB image, synthesizes a baseband composite
//! signal with the full scanline structure of an NTSC broadcast line (front
//! porch, sync tip, breezeway, color burst, back porch, active video),
//! optionally corrupts it with noise, and demodulates it back into RGB the
//! way a CRT receiver would: sync search by signal integration, chroma phase
//! recovery from the color burst, YIQ separation by band filtering, and the
//! characteristic chroma/luma crosstalk artifacts.
//!
//! Everything is fixed-point integer arithmetic; there is no floating point
//! anywhere in the signal path. The core never allocates per call and never
//! performs I/O; images move in and out as packed byte buffers with a
//! declared [`PixelFormat`].

pub mod constants;
mod crt;
mod decoder;
mod encoder;
pub mod filters;
pub mod fixed;

pub use crt::{bpp4fmt, CcState, Crt, PixelFormat};
pub use encoder::NtscSettings;
