pub mod sim {
    pub mod grid;
    pub mod kernels;
    pub mod offsets;
    pub mod params;
    pub mod schedule;
    pub mod sort;
}

pub mod cpu {
    pub mod solver;
}

pub mod gpu {
    pub mod buffers;
    pub mod draw;
    pub mod ffi;
    pub mod pipeline;
}
