//! Calibrate, quantize and serialize model weight tensors.
//!
//! Each tensor goes through four stages: calibration statistics, clipping
//! range selection, symmetric INT8 quantization with an FP16 fallback, and
//! serialization into a self-describing binary file. A
//! [`ConversionAccumulator`] threaded through every call collects run-level
//! statistics.

pub mod accumulator;
pub mod calibration;
pub mod config;
pub mod errors;
pub mod format;
pub mod pipeline;
pub mod quantization;
pub mod tensor;

pub use accumulator::{ConversionAccumulator, ConversionSummary};
pub use calibration::{select_range, CalibrationStatistics, ClipMethod, ClipRange, RangeConfig};
pub use config::{Config, QuantizationOptions};
pub use errors::{PackError, Result};
pub use format::{read_header, read_tensor_file, write_tensor_file, TensorHeader, TensorPayload};
pub use pipeline::{Converter, OutputTarget, TensorReport};
pub use quantization::{
    FallbackReason, FidelityMetrics, QuantConfig, QuantizationOutcome, Quantizer,
};
pub use tensor::{Precision, Tensor, TensorRole};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
