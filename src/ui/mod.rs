pub mod icons;
pub mod preview;

pub use preview::{PreviewRenderer, RenderLine};
