pub mod line_reader;

pub use line_reader::{read_lines, Line, LineReadError};
