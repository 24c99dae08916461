// Text measurement shared by extraction (span widths) and reconstruction
// (wrapping and alignment of inserted text).

pub mod font_metrics;
pub mod wrap;

pub use font_metrics::{metrics_for_font, FontFamily};
pub use wrap::{chars_per_line, wrap_text};
