use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod common;
pub mod config;
pub mod dimension;
pub mod extract;
pub mod facts;
pub mod normalize;
pub mod pipeline;
pub mod relationship;
pub mod sink;
