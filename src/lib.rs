/*!
    transaction engine for the half-duplex serial bus used by protocol 1.0 smart servos
    
    - [frame] encodes instruction packets and validates status packets, it has no I/O and works in `no_std`
    - [registers] describes the servos' control table
    - [master] (feature `master`) owns the serial line and serializes transactions from any number of callers
*/
#![cfg_attr(not(feature = "std"), no_std)]

mod utils;

pub mod frame;
pub mod registers;
#[cfg(feature = "master")]
pub mod master;
