//! Cutout Service Library
//!
//! Local HTTP service for the flyer desktop app: background removal and OCR.
//! The binary in main.rs serves the routes and doubles as the OCR worker.
//!
//! # Modules
//!
//! - `cutout`: background removal pipeline and orientation correction
//! - `ocr`: isolated, single-flight text recognition
//! - `routes`: HTTP handlers and router assembly

pub mod config;
pub mod cutout;
pub mod error;
pub mod ocr;
pub mod routes;
pub mod state;
