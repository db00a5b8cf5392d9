//! s3url-s3: aws-sdk-s3 backend for s3-url
//!
//! Implements the `ObjectStore` trait from s3url-core on top of aws-sdk-s3.

pub mod client;
mod error;

pub use client::{COPY_PART_SIZE, MAX_SINGLE_COPY_SIZE, PART_SIZE, S3Client, load_sdk_config};
