pub mod image_io;
pub mod sink;

pub use image_io::{load_image, load_mask, save_frame, save_image, OutputFormat};
pub use sink::{FileSink, Orientation, OutputDirective, OutputSink};
