// lib.rs
pub mod commands;
pub mod config;
pub mod error;
pub mod faidx;
pub mod families;
pub mod interval;
pub mod io;
pub mod maf;
pub mod pairing;
pub mod presence;
pub mod region_filter;
pub mod repeats;
pub mod sequence_index;
pub mod similarity;
pub mod species;
pub mod summary;
