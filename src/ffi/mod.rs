//! Foreign Function Interface for dsp48-emu.
//!
//! This module provides C-callable functions for driving the slice model and
//! the tensor tile from C/C++ testbenches.
//!
//! # Safety
//! All functions in this module use `unsafe` extern "C" ABI and must be
//! called with valid pointers. Null pointer checks are performed where
//! appropriate.
//!
//! # Memory Management
//! - Handles returned by `dsp48_model_create` must be freed with
//!   `dsp48_model_destroy`.
//! - Matrix data is read from and written to caller buffers in place; the
//!   caller retains ownership of their pointers.

use std::ffi::{c_char, c_int};
use std::slice;

use crate::fmul::fmul_bits;
use crate::slice::{evaluate, AluMode, CarryInSel, InMode, OpMode, SliceControl, SliceInputs};
use crate::tensor::{
    self_test, ErrorKind, FormatDesc, FormatKind, Matrix, MatrixMut, ModelError,
    PipelineConfig, SelfTestError, TensorUnit,
};

/// Opaque handle to a tensor tile.
pub struct Dsp48Model {
    unit: TensorUnit,
}

/// Result codes for FFI operations.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dsp48Result {
    Success = 0,
    NullPointer = 1,
    ConfigError = 2,
    AllocationError = 3,
    BoundsError = 4,
    SelfTestFailed = 5,
}

impl From<&ModelError> for Dsp48Result {
    fn from(err: &ModelError) -> Self {
        match err.kind() {
            ErrorKind::Configuration => Dsp48Result::ConfigError,
            ErrorKind::Allocation => Dsp48Result::AllocationError,
            ErrorKind::Bounds => Dsp48Result::BoundsError,
        }
    }
}

/// Element format tag, carried as a `u32` in `Dsp48FormatDesc::kind`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dsp48FormatKind {
    Fp32 = 0,
    Bfloat16 = 1,
    Fp16 = 2,
    Int8 = 3,
    Custom = 4,
}

impl Dsp48FormatKind {
    /// Decode a raw tag from C, or `None` if it names no format.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Dsp48FormatKind::Fp32),
            1 => Some(Dsp48FormatKind::Bfloat16),
            2 => Some(Dsp48FormatKind::Fp16),
            3 => Some(Dsp48FormatKind::Int8),
            4 => Some(Dsp48FormatKind::Custom),
            _ => None,
        }
    }
}

/// Element format layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dsp48FormatDesc {
    /// A `Dsp48FormatKind` value.
    pub kind: u32,
    pub total_bits: u8,
    pub exponent_bits: u8,
    pub mantissa_bits: u8,
    pub fractional_bits: u8,
    pub exponent_bias: i32,
}

/// Pipeline configuration.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dsp48Config {
    pub format: Dsp48FormatDesc,
    pub multiplier_latency: u32,
    pub adder_latency: u32,
    pub accumulator_latency: u32,
    pub rounding_latency: u32,
    pub saturation_latency: u32,
    /// 0 or 1.
    pub enable_rounding: c_int,
    /// 0 or 1.
    pub enable_saturation: c_int,
}

/// Slice operand and feedback ports.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Dsp48SliceInputs {
    pub a1: i64,
    pub a2: i64,
    pub b1: i64,
    pub b2: i64,
    pub c: i64,
    pub d: i64,
    pub p: i64,
    pub pcin: i64,
    /// 0 or 1.
    pub carrycascout: c_int,
}

/// Slice control fields; raw values are masked to their widths, carry bits
/// must be 0 or 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Dsp48SliceControl {
    pub opmode: u8,
    pub alumode: u8,
    pub inmode: u8,
    pub carryinsel: u8,
    pub carryin: c_int,
    pub carrycascin: c_int,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<FormatKind> for Dsp48FormatKind {
    fn from(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Fp32 => Dsp48FormatKind::Fp32,
            FormatKind::Bfloat16 => Dsp48FormatKind::Bfloat16,
            FormatKind::Fp16 => Dsp48FormatKind::Fp16,
            FormatKind::Int8 => Dsp48FormatKind::Int8,
            FormatKind::Custom => Dsp48FormatKind::Custom,
        }
    }
}

impl From<Dsp48FormatKind> for FormatKind {
    fn from(kind: Dsp48FormatKind) -> Self {
        match kind {
            Dsp48FormatKind::Fp32 => FormatKind::Fp32,
            Dsp48FormatKind::Bfloat16 => FormatKind::Bfloat16,
            Dsp48FormatKind::Fp16 => FormatKind::Fp16,
            Dsp48FormatKind::Int8 => FormatKind::Int8,
            Dsp48FormatKind::Custom => FormatKind::Custom,
        }
    }
}

impl From<&PipelineConfig> for Dsp48Config {
    fn from(config: &PipelineConfig) -> Self {
        let format = config.format;
        Self {
            format: Dsp48FormatDesc {
                kind: Dsp48FormatKind::from(format.kind) as u32,
                total_bits: format.total_bits,
                exponent_bits: format.exponent_bits,
                mantissa_bits: format.mantissa_bits,
                fractional_bits: format.fractional_bits,
                exponent_bias: format.bias,
            },
            multiplier_latency: config.multiplier_latency,
            adder_latency: config.adder_latency,
            accumulator_latency: config.accumulator_latency,
            rounding_latency: config.rounding_latency,
            saturation_latency: config.saturation_latency,
            enable_rounding: config.enable_rounding as c_int,
            enable_saturation: config.enable_saturation as c_int,
        }
    }
}

impl TryFrom<&Dsp48Config> for PipelineConfig {
    type Error = Dsp48Result;

    fn try_from(config: &Dsp48Config) -> Result<Self, Self::Error> {
        let kind = Dsp48FormatKind::from_raw(config.format.kind).ok_or_else(|| {
            log::error!("Unknown format kind {}", config.format.kind);
            Dsp48Result::ConfigError
        })?;
        Ok(Self {
            format: FormatDesc {
                kind: kind.into(),
                total_bits: config.format.total_bits,
                exponent_bits: config.format.exponent_bits,
                mantissa_bits: config.format.mantissa_bits,
                fractional_bits: config.format.fractional_bits,
                bias: config.format.exponent_bias,
            },
            multiplier_latency: config.multiplier_latency,
            adder_latency: config.adder_latency,
            accumulator_latency: config.accumulator_latency,
            rounding_latency: config.rounding_latency,
            saturation_latency: config.saturation_latency,
            enable_rounding: flag("enable_rounding", config.enable_rounding)?,
            enable_saturation: flag("enable_saturation", config.enable_saturation)?,
        })
    }
}

/// Decode a C truth value that must be exactly 0 or 1.
fn flag(name: &str, value: c_int) -> Result<bool, Dsp48Result> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => {
            log::error!("{} must be 0 or 1, got {}", name, value);
            Err(Dsp48Result::ConfigError)
        }
    }
}

// ============================================================================
// Tensor Tile
// ============================================================================

/// Fill `cfg` with the default FP32 pipeline (latencies 2/1/1/1/0, rounding
/// on, saturation off).
///
/// # Safety
/// `cfg` must point to writable memory for one `Dsp48Config`.
#[no_mangle]
pub unsafe extern "C" fn dsp48_default_fp32_config(cfg: *mut Dsp48Config) -> Dsp48Result {
    if cfg.is_null() {
        return Dsp48Result::NullPointer;
    }
    *cfg = Dsp48Config::from(&PipelineConfig::default());
    Dsp48Result::Success
}

/// Create a tensor tile of `rows × cols` lanes with contraction depth `depth`.
///
/// # Safety
/// - `config` must point to a valid `Dsp48Config`
/// - `out` must point to writable storage for one handle pointer
///
/// On success `*out` holds a handle that must be freed with
/// `dsp48_model_destroy`; on failure `*out` is set to null.
#[no_mangle]
pub unsafe extern "C" fn dsp48_model_create(
    config: *const Dsp48Config,
    rows: usize,
    cols: usize,
    depth: usize,
    out: *mut *mut Dsp48Model,
) -> Dsp48Result {
    if config.is_null() || out.is_null() {
        return Dsp48Result::NullPointer;
    }
    *out = std::ptr::null_mut();

    // Initialize logging if not already done
    let _ = env_logger::try_init();

    let config = match PipelineConfig::try_from(&*config) {
        Ok(config) => config,
        Err(result) => return result,
    };
    match TensorUnit::new(config, rows, cols, depth) {
        Ok(unit) => {
            *out = Box::into_raw(Box::new(Dsp48Model { unit }));
            Dsp48Result::Success
        }
        Err(e) => {
            log::error!("Failed to create tensor unit: {}", e);
            Dsp48Result::from(&e)
        }
    }
}

/// Destroy a tensor tile.
///
/// # Safety
/// `model` must be a valid pointer returned by `dsp48_model_create`,
/// or null (in which case this is a no-op).
#[no_mangle]
pub unsafe extern "C" fn dsp48_model_destroy(model: *mut Dsp48Model) {
    if !model.is_null() {
        drop(Box::from_raw(model));
    }
}

/// Reset accumulators, pipeline slots and the cycle counter.
///
/// # Safety
/// `model` must be a valid handle or null.
#[no_mangle]
pub unsafe extern "C" fn dsp48_model_reset(model: *mut Dsp48Model) -> Dsp48Result {
    if model.is_null() {
        return Dsp48Result::NullPointer;
    }
    (*model).unit.reset();
    Dsp48Result::Success
}

/// Advance one lane by one cycle.
///
/// # Safety
/// - `model` must be a valid handle
/// - `out_valid` and `out_value` may each be null to skip that output
#[no_mangle]
pub unsafe extern "C" fn dsp48_model_step_fp32(
    model: *mut Dsp48Model,
    row: usize,
    col: usize,
    input_valid: c_int,
    a: f32,
    b: f32,
    addend: f32,
    out_valid: *mut c_int,
    out_value: *mut f32,
) -> Dsp48Result {
    if model.is_null() {
        return Dsp48Result::NullPointer;
    }
    let unit = &mut (*model).unit;

    match unit.step(row, col, input_valid != 0, a, b, addend) {
        Ok(out) => {
            if !out_valid.is_null() {
                *out_valid = out.valid as c_int;
            }
            if !out_value.is_null() {
                *out_value = out.value;
            }
            Dsp48Result::Success
        }
        Err(e) => {
            log::warn!("step rejected: {}", e);
            Dsp48Result::from(&e)
        }
    }
}

/// Run a full GEMM tile: `dst = lhs · rhs + bias`.
///
/// # Safety
/// - `model` must be a valid handle
/// - `lhs` must hold `(rows - 1) * lhs_stride + depth` floats
/// - `rhs` must hold `(depth - 1) * rhs_stride + cols` floats
/// - `bias` must be null or hold `cols` floats
/// - `dst` must hold `(rows - 1) * dst_stride + cols` writable floats
#[no_mangle]
pub unsafe extern "C" fn dsp48_model_gemm_fp32(
    model: *mut Dsp48Model,
    lhs: *const f32,
    lhs_stride: usize,
    rhs: *const f32,
    rhs_stride: usize,
    bias: *const f32,
    dst: *mut f32,
    dst_stride: usize,
) -> Dsp48Result {
    if model.is_null() || lhs.is_null() || rhs.is_null() || dst.is_null() {
        return Dsp48Result::NullPointer;
    }
    let unit = &mut (*model).unit;
    let (rows, cols, depth) = (unit.rows(), unit.cols(), unit.depth());
    if !unit.is_allocated() {
        return Dsp48Result::ConfigError;
    }
    if lhs_stride < depth || rhs_stride < cols || dst_stride < cols {
        return Dsp48Result::BoundsError;
    }

    let (Some(lhs_len), Some(rhs_len), Some(dst_len)) = (
        layout_len(rows, lhs_stride, depth),
        layout_len(depth, rhs_stride, cols),
        layout_len(rows, dst_stride, cols),
    ) else {
        return Dsp48Result::BoundsError;
    };

    let lhs = Matrix::new(slice::from_raw_parts(lhs, lhs_len), lhs_stride);
    let rhs = Matrix::new(slice::from_raw_parts(rhs, rhs_len), rhs_stride);
    let bias = if bias.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(bias, cols))
    };
    let dst = MatrixMut::new(slice::from_raw_parts_mut(dst, dst_len), dst_stride);

    match unit.gemm(lhs, rhs, bias, dst) {
        Ok(()) => Dsp48Result::Success,
        Err(e) => {
            log::error!("gemm failed: {}", e);
            Dsp48Result::from(&e)
        }
    }
}

/// Cycles executed since the last reset (0 for a null handle).
///
/// # Safety
/// `model` must be a valid handle or null.
#[no_mangle]
pub unsafe extern "C" fn dsp48_model_cycle(model: *const Dsp48Model) -> u64 {
    if model.is_null() {
        return 0;
    }
    (*model).unit.cycle()
}

/// Run the built-in GEMM self check.
#[no_mangle]
pub extern "C" fn dsp48_self_test_fp32() -> Dsp48Result {
    match self_test() {
        Ok(_) => Dsp48Result::Success,
        Err(SelfTestError::Model(e)) => Dsp48Result::from(&e),
        Err(e @ SelfTestError::Mismatch { .. }) => {
            log::error!("{}", e);
            Dsp48Result::SelfTestFailed
        }
    }
}

// ============================================================================
// Slice and Arithmetic
// ============================================================================

/// Evaluate one slice and write the 48-bit P output to `out_p`.
///
/// # Safety
/// `inputs` and `control` must point to valid structs; `out_p` must be
/// writable.
#[no_mangle]
pub unsafe extern "C" fn dsp48_slice_eval(
    inputs: *const Dsp48SliceInputs,
    control: *const Dsp48SliceControl,
    out_p: *mut i64,
) -> Dsp48Result {
    if inputs.is_null() || control.is_null() || out_p.is_null() {
        return Dsp48Result::NullPointer;
    }
    let ports = &*inputs;
    let ctrl = &*control;

    let (carrycascout, carryin, carrycascin) = match (
        flag("carrycascout", ports.carrycascout),
        flag("carryin", ctrl.carryin),
        flag("carrycascin", ctrl.carrycascin),
    ) {
        (Ok(cascout), Ok(carryin), Ok(cascin)) => (cascout, carryin, cascin),
        _ => return Dsp48Result::ConfigError,
    };

    let inputs = SliceInputs {
        a1: ports.a1,
        a2: ports.a2,
        b1: ports.b1,
        b2: ports.b2,
        c: ports.c,
        d: ports.d,
        p: ports.p,
        pcin: ports.pcin,
        carrycascout,
    };
    let control = SliceControl {
        opmode: OpMode::new(ctrl.opmode),
        alumode: AluMode::new(ctrl.alumode),
        inmode: InMode::new(ctrl.inmode),
        carryinsel: CarryInSel::new(ctrl.carryinsel),
        carryin,
        carrycascin,
    };

    *out_p = evaluate(&inputs, &control);
    Dsp48Result::Success
}

/// Multiply two FP32 bit patterns through the slice.
#[no_mangle]
pub extern "C" fn dsp48_fmul_bits(a: u32, b: u32) -> u32 {
    fmul_bits(a, b)
}

/// Crate version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn dsp48_emu_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Elements spanned by `rows` rows of `row_len` at `stride`.
fn layout_len(rows: usize, stride: usize, row_len: usize) -> Option<usize> {
    rows.checked_sub(1)?.checked_mul(stride)?.checked_add(row_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    unsafe fn create(config: &Dsp48Config, rows: usize, cols: usize, depth: usize) -> *mut Dsp48Model {
        let mut model = std::ptr::null_mut();
        let result = dsp48_model_create(config, rows, cols, depth, &mut model);
        assert_eq!(result, Dsp48Result::Success);
        assert!(!model.is_null());
        model
    }

    fn default_config() -> Dsp48Config {
        Dsp48Config::from(&PipelineConfig::default())
    }

    #[test]
    fn test_default_config_round_trips() {
        let mut cfg = default_config();
        cfg.multiplier_latency = 9;
        let result = unsafe { dsp48_default_fp32_config(&mut cfg) };
        assert_eq!(result, Dsp48Result::Success);
        assert_eq!(cfg.multiplier_latency, 2);
        assert_eq!(cfg.format.kind, Dsp48FormatKind::Fp32 as u32);
        assert_eq!(PipelineConfig::try_from(&cfg), Ok(PipelineConfig::default()));

        assert_eq!(
            unsafe { dsp48_default_fp32_config(std::ptr::null_mut()) },
            Dsp48Result::NullPointer
        );
    }

    #[test]
    fn test_create_errors() {
        let mut model = std::ptr::null_mut();
        let cfg = default_config();
        let result = unsafe { dsp48_model_create(&cfg, 0, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::ConfigError);
        assert!(model.is_null());

        let mut cfg = default_config();
        cfg.format.kind = Dsp48FormatKind::Int8 as u32;
        let result = unsafe { dsp48_model_create(&cfg, 2, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::ConfigError);

        let cfg = default_config();
        let result = unsafe { dsp48_model_create(&cfg, usize::MAX, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::AllocationError);

        let result = unsafe { dsp48_model_create(std::ptr::null(), 2, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::NullPointer);
    }

    #[test]
    fn test_create_rejects_out_of_range_c_values() {
        let mut model = std::ptr::null_mut();

        let mut cfg = default_config();
        cfg.format.kind = 7;
        let result = unsafe { dsp48_model_create(&cfg, 2, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::ConfigError);
        assert!(model.is_null());

        let mut cfg = default_config();
        cfg.enable_rounding = 2;
        let result = unsafe { dsp48_model_create(&cfg, 2, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::ConfigError);

        let mut cfg = default_config();
        cfg.enable_saturation = -1;
        let result = unsafe { dsp48_model_create(&cfg, 2, 2, 2, &mut model) };
        assert_eq!(result, Dsp48Result::ConfigError);
        assert!(model.is_null());

        let mut cfg = default_config();
        cfg.enable_saturation = 1;
        unsafe {
            let model = create(&cfg, 1, 1, 1);
            dsp48_model_destroy(model);
        }
    }

    #[test]
    fn test_step_and_cycle() {
        let mut cfg = default_config();
        cfg.enable_rounding = 0;
        unsafe {
            let model = create(&cfg, 1, 2, 1);
            let mut valid = -1;
            let mut value = -1.0f32;

            let result = dsp48_model_step_fp32(model, 0, 1, 1, 2.0, 3.0, 0.0, &mut valid, &mut value);
            assert_eq!(result, Dsp48Result::Success);
            assert_eq!((valid, value), (0, 0.0));

            for _ in 0..5 {
                dsp48_model_step_fp32(
                    model,
                    0,
                    1,
                    0,
                    0.0,
                    0.0,
                    0.0,
                    &mut valid,
                    std::ptr::null_mut(),
                );
            }
            assert_eq!(valid, 1);
            assert_eq!(dsp48_model_cycle(model), 6);

            let result = dsp48_model_step_fp32(
                model,
                1,
                0,
                1,
                1.0,
                1.0,
                0.0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            assert_eq!(result, Dsp48Result::BoundsError);

            assert_eq!(dsp48_model_reset(model), Dsp48Result::Success);
            assert_eq!(dsp48_model_cycle(model), 0);
            dsp48_model_destroy(model);
        }
        assert_eq!(unsafe { dsp48_model_cycle(std::ptr::null()) }, 0);
    }

    #[test]
    fn test_gemm_through_ffi() {
        let mut cfg = default_config();
        cfg.enable_rounding = 0;
        let lhs = [1.0f32, 2.0, 3.0, -1.0, -2.0, -3.0];
        let rhs = [4.0f32, 5.0, 6.0, 7.0, 8.0, 9.0];
        let bias = [0.5f32, -0.5];
        let mut dst = [0.0f32; 4];

        unsafe {
            let model = create(&cfg, 2, 2, 3);
            let result = dsp48_model_gemm_fp32(
                model,
                lhs.as_ptr(),
                3,
                rhs.as_ptr(),
                2,
                bias.as_ptr(),
                dst.as_mut_ptr(),
                2,
            );
            assert_eq!(result, Dsp48Result::Success);
            assert_eq!(dst, [40.5, 45.5, -39.5, -46.5]);

            let result = dsp48_model_gemm_fp32(
                model,
                lhs.as_ptr(),
                2,
                rhs.as_ptr(),
                2,
                std::ptr::null(),
                dst.as_mut_ptr(),
                2,
            );
            assert_eq!(result, Dsp48Result::BoundsError);

            let result = dsp48_model_gemm_fp32(
                model,
                std::ptr::null(),
                3,
                rhs.as_ptr(),
                2,
                std::ptr::null(),
                dst.as_mut_ptr(),
                2,
            );
            assert_eq!(result, Dsp48Result::NullPointer);
            dsp48_model_destroy(model);
        }
    }

    #[test]
    fn test_slice_eval() {
        let inputs = Dsp48SliceInputs {
            a2: 3,
            b2: 5,
            ..Dsp48SliceInputs::default()
        };
        let control = Dsp48SliceControl {
            opmode: 0b000_0101,
            ..Dsp48SliceControl::default()
        };
        let mut p = 0i64;
        let result = unsafe { dsp48_slice_eval(&inputs, &control, &mut p) };
        assert_eq!(result, Dsp48Result::Success);
        assert_eq!(p, 15);

        let result = unsafe { dsp48_slice_eval(&inputs, &control, std::ptr::null_mut()) };
        assert_eq!(result, Dsp48Result::NullPointer);

        // Carry bits outside 0/1 are rejected
        let bad_control = Dsp48SliceControl {
            carryin: 2,
            ..control
        };
        let result = unsafe { dsp48_slice_eval(&inputs, &bad_control, &mut p) };
        assert_eq!(result, Dsp48Result::ConfigError);
        let bad_inputs = Dsp48SliceInputs {
            carrycascout: 5,
            ..inputs
        };
        let result = unsafe { dsp48_slice_eval(&bad_inputs, &control, &mut p) };
        assert_eq!(result, Dsp48Result::ConfigError);
        assert_eq!(p, 15);
    }

    #[test]
    fn test_scalar_entry_points() {
        let bits = dsp48_fmul_bits(1.5f32.to_bits(), 2.5f32.to_bits());
        assert_eq!(f32::from_bits(bits), 3.75);
        assert_eq!(dsp48_self_test_fp32(), Dsp48Result::Success);

        let version = unsafe { CStr::from_ptr(dsp48_emu_version()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_layout_len() {
        assert_eq!(layout_len(2, 3, 3), Some(6));
        assert_eq!(layout_len(1, 100, 4), Some(4));
        assert_eq!(layout_len(0, 3, 3), None);
        assert_eq!(layout_len(usize::MAX, 2, 1), None);
    }
}
