use std::error::Error;
use core::fmt::Display;

#[derive(Debug)]
pub enum MemError {
    LoadOutOfBounds,
}
impl Error for MemError {}
impl Display for MemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            MemError::LoadOutOfBounds => write!(f, "An attempt was made to load an image out of address space bounds."),
        }
    }
}
