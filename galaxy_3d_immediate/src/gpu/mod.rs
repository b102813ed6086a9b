/// GPU module - buffers backed by a `MemoryAllocator`

pub mod gpu_buffer;

pub use gpu_buffer::*;
