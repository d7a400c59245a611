//! A library for reading BNTX texture containers and decoding their
//! tiled image data.
//!
//! # Getting Started
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bntx = bntx_lib::bntx::Bntx::from_file("textures.bntx")?;
//! for texture in &bntx.textures {
//!     let linear = texture.deswizzled_image_data()?;
//!     println!("{}: {} bytes", texture.name, linear.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! Parsing fully decodes the container into owned values. No type retains
//! a reference into the source buffer, and structural errors like a bad
//! signature or an out of bounds offset fail the whole parse since every
//! descriptor is reached through interdependent pointer indirections.
//!
//! Textures with unrecognized format codes or multiple faces still parse
//! into [bntx::Texture] values. They are classified and reported when image
//! conversion is attempted, so one unsupported entry never hides the rest
//! of the container.
//!
//! The layout engine in [swizzle] is a pure coordinate transform over
//! opaque blocks. It knows nothing about output containers, and the
//! [dds] and [astc] serializers consume only its decoded bytes and the
//! texture metadata.
pub mod astc;
pub mod bntx;
pub mod dds;
pub mod swizzle;
