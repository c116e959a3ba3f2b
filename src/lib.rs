//! Diagram interchange and geometry engine.
//!
//! This crate owns the portable scene document, the geometry of attachment
//! ports on nodes, connector routing, bulk layout for unpositioned nodes, and
//! the two-way conversion between the portable [`scene::Scene`] and a live
//! [`render::RenderTree`]. All mutation after import flows through the
//! operations in [`ops`], which keep the render tree and the logical scene in
//! sync.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`scene`] | Document types, id generation, validation and parsing |
//! | [`ports`] | Port geometry, world-coordinate resolution, attachment registry |
//! | [`routing`] | Straight, orthogonal and curved connector paths |
//! | [`layout`] | Grid, flow, hierarchical and force-directed placement |
//! | [`assets`] | Cached, batched icon lookup over an injected service |
//! | [`render`] | Render target contract and the in-memory render tree |
//! | [`engine`] | Shared engine state used by import, export and ops |
//! | [`import`] | Scene document → render tree |
//! | [`export`] | Render tree → scene document |
//! | [`ops`] | Single-entity and batch mutation commands |
//! | [`config`] | Engine configuration from environment variables |
//! | [`geometry`] | Points, transforms and bounds |
//! | [`consts`] | Shared numeric constants |

pub mod assets;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod export;
pub mod geometry;
pub mod import;
pub mod layout;
pub mod ops;
pub mod ports;
pub mod render;
pub mod routing;
pub mod scene;

pub use engine::Engine;
pub use error::ErrorCode;
