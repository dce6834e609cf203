use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::{
    ffi::CString,
    os::raw::{c_char, c_int, c_void},
    ptr,
};
use tracing::info;

use crate::{decode_head, CandidateDetection, DeviceNets, ModelVariant, VisionConfig};

#[repr(C)]
struct TfLiteModel;
#[repr(C)]
struct TfLiteInterpreterOptions;
#[repr(C)]
struct TfLiteInterpreter;
#[repr(C)]
struct TfLiteTensor;

#[link(name = "tensorflowlite_c")]
extern "C" {
    fn TfLiteModelCreateFromFile(model_path: *const c_char) -> *mut TfLiteModel;
    fn TfLiteModelDelete(model: *mut TfLiteModel);

    fn TfLiteInterpreterOptionsCreate() -> *mut TfLiteInterpreterOptions;
    fn TfLiteInterpreterOptionsDelete(options: *mut TfLiteInterpreterOptions);
    fn TfLiteInterpreterOptionsSetNumThreads(options: *mut TfLiteInterpreterOptions, num_threads: c_int);

    fn TfLiteInterpreterCreate(
        model: *const TfLiteModel,
        options: *const TfLiteInterpreterOptions,
    ) -> *mut TfLiteInterpreter;
    fn TfLiteInterpreterDelete(interpreter: *mut TfLiteInterpreter);

    fn TfLiteInterpreterAllocateTensors(interpreter: *mut TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterInvoke(interpreter: *mut TfLiteInterpreter) -> c_int;

    fn TfLiteInterpreterGetInputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *mut TfLiteTensor;
    fn TfLiteInterpreterGetOutputTensor(
        interpreter: *mut TfLiteInterpreter,
        index: c_int,
    ) -> *const TfLiteTensor;
    fn TfLiteInterpreterGetOutputTensorCount(interpreter: *const TfLiteInterpreter) -> c_int;

    fn TfLiteTensorData(tensor: *const TfLiteTensor) -> *mut c_void;
    fn TfLiteTensorByteSize(tensor: *const TfLiteTensor) -> usize;

    fn TfLiteTensorNumDims(tensor: *const TfLiteTensor) -> c_int;
    fn TfLiteTensorDim(tensor: *const TfLiteTensor, dim_index: c_int) -> c_int;
}

/// One loaded flatbuffer + interpreter.
struct Net {
    model: *mut TfLiteModel,
    opts: *mut TfLiteInterpreterOptions,
    interp: *mut TfLiteInterpreter,
}

unsafe impl Send for Net {}

impl Net {
    fn load(path: &str) -> Result<Self> {
        let cpath = CString::new(path)?;
        let model = unsafe { TfLiteModelCreateFromFile(cpath.as_ptr()) };
        anyhow::ensure!(!model.is_null(), "failed to load tflite model: {}", path);

        let opts = unsafe { TfLiteInterpreterOptionsCreate() };
        anyhow::ensure!(!opts.is_null(), "failed to create tflite options");
        unsafe { TfLiteInterpreterOptionsSetNumThreads(opts, 2) }; // conservative

        let interp = unsafe { TfLiteInterpreterCreate(model, opts) };
        anyhow::ensure!(!interp.is_null(), "failed to create tflite interpreter");

        let rc = unsafe { TfLiteInterpreterAllocateTensors(interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterAllocateTensors failed for {}", path);

        info!("vision: loaded TFLite model: {}", path);
        Ok(Self { model, opts, interp })
    }

    fn fill_input_f32(&mut self, index: c_int, data: &[f32]) -> Result<()> {
        let input = unsafe { TfLiteInterpreterGetInputTensor(self.interp, index) };
        anyhow::ensure!(!input.is_null(), "no input tensor {}", index);

        // Exact match: a short write would leave stale bytes in the tensor
        // tail, so a wrong class count or patch resolution fails here.
        let in_bytes = unsafe { TfLiteTensorByteSize(input) };
        let need = std::mem::size_of_val(data);
        anyhow::ensure!(
            in_bytes == need,
            "input tensor {} size mismatch: tensor {} bytes, data {} bytes",
            index,
            in_bytes,
            need
        );

        let in_ptr = unsafe { TfLiteTensorData(input) as *mut f32 };
        anyhow::ensure!(!in_ptr.is_null(), "null input tensor data");
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), in_ptr, data.len()) };
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        let rc = unsafe { TfLiteInterpreterInvoke(self.interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterInvoke failed");
        Ok(())
    }

    fn output_f32(&self, index: c_int) -> Result<(Vec<f32>, Vec<i32>)> {
        let out = unsafe { TfLiteInterpreterGetOutputTensor(self.interp, index) };
        anyhow::ensure!(!out.is_null(), "no output tensor {}", index);

        let out_ptr = unsafe { TfLiteTensorData(out) as *const f32 };
        anyhow::ensure!(!out_ptr.is_null(), "null output tensor data");
        let out_bytes = unsafe { TfLiteTensorByteSize(out) };
        let out_len = out_bytes / std::mem::size_of::<f32>();

        let raw = unsafe { std::slice::from_raw_parts(out_ptr, out_len) }.to_vec();
        Ok((raw, tensor_dims(out)))
    }

    fn output_count(&self) -> c_int {
        unsafe { TfLiteInterpreterGetOutputTensorCount(self.interp) }
    }

    fn describe(&self) -> String {
        let input = unsafe { TfLiteInterpreterGetInputTensor(self.interp, 0) };
        let mut s = String::new();
        if !input.is_null() {
            s.push_str(&format!(
                "- input[0] dims={:?} bytes={}\n",
                tensor_dims(input),
                unsafe { TfLiteTensorByteSize(input) }
            ));
        }
        for i in 0..self.output_count() {
            let out = unsafe { TfLiteInterpreterGetOutputTensor(self.interp, i) };
            if !out.is_null() {
                s.push_str(&format!(
                    "- output[{}] dims={:?} bytes={}\n",
                    i,
                    tensor_dims(out),
                    unsafe { TfLiteTensorByteSize(out) }
                ));
            }
        }
        s
    }
}

impl Drop for Net {
    fn drop(&mut self) {
        unsafe {
            if !self.interp.is_null() {
                TfLiteInterpreterDelete(self.interp);
            }
            if !self.opts.is_null() {
                TfLiteInterpreterOptionsDelete(self.opts);
            }
            if !self.model.is_null() {
                TfLiteModelDelete(self.model);
            }
        }
    }
}

fn tensor_dims(t: *const TfLiteTensor) -> Vec<i32> {
    unsafe {
        let nd = TfLiteTensorNumDims(t);
        let mut v = Vec::with_capacity(nd as usize);
        for i in 0..nd {
            v.push(TfLiteTensorDim(t, i));
        }
        v
    }
}

/// TFLite-backed networks: both detector weight sets loaded up front and
/// selected by `ModelVariant`, plus the separate state classifier. Variant
/// switching happens between frames, never mid-frame.
pub struct TfliteNets {
    cfg: VisionConfig,
    regular: Net,
    lowlight: Net,
    state: Net,
    active: ModelVariant,
}

impl TfliteNets {
    pub fn new(cfg: VisionConfig) -> Result<Self> {
        let regular = Net::load(&cfg.model_path_regular).context("load regular detector")?;
        let lowlight = Net::load(&cfg.model_path_lowlight).context("load low-light detector")?;
        let state = Net::load(&cfg.state_model_path).context("load state classifier")?;
        Ok(Self { cfg, regular, lowlight, state, active: ModelVariant::Regular })
    }

    pub fn inspect(&self) -> String {
        format!(
            "TFLite inspect:\nregular:\n{}low-light:\n{}state:\n{}",
            self.regular.describe(),
            self.lowlight.describe(),
            self.state.describe()
        )
    }

    fn active_net(&mut self) -> &mut Net {
        match self.active {
            ModelVariant::Regular => &mut self.regular,
            ModelVariant::LowLight => &mut self.lowlight,
        }
    }
}

impl DeviceNets for TfliteNets {
    fn detect(&mut self, fused: &RgbImage, conf_threshold: f32) -> Result<Vec<CandidateDetection>> {
        let (frame_w, frame_h) = fused.dimensions();
        let (in_w, in_h) = (self.cfg.input_w, self.cfg.input_h);
        let num_classes = self.cfg.num_base_classes;

        // 1/255 scaling, no mean subtraction, same as training preprocessing.
        let resized = imageops::resize(fused, in_w, in_h, FilterType::Triangle);
        let mut input = Vec::with_capacity((in_w * in_h * 3) as usize);
        for px in resized.pixels() {
            input.push(px.0[0] as f32 / 255.0);
            input.push(px.0[1] as f32 / 255.0);
            input.push(px.0[2] as f32 / 255.0);
        }

        let stride = 5 + num_classes;
        let net = self.active_net();
        net.fill_input_f32(0, &input)?;
        net.invoke()?;

        let head_count = net.output_count();
        anyhow::ensure!(head_count == 2, "expected 2 detector output heads, got {}", head_count);

        let mut cands = Vec::new();
        for head in 0..head_count {
            let (raw, dims) = net.output_f32(head)?;
            let (num_preds, got_stride) = match dims.as_slice() {
                [1, n, s] => (*n as usize, *s as usize),
                [n, s] => (*n as usize, *s as usize),
                other => anyhow::bail!(
                    "unexpected output dims {:?}. Run `irspot vision inspect` to view tensors.",
                    other
                ),
            };
            anyhow::ensure!(
                got_stride == stride,
                "stride mismatch on head {}: got {}, expected {}",
                head,
                got_stride,
                stride
            );
            cands.extend(decode_head(&raw, num_preds, num_classes, conf_threshold, frame_w, frame_h));
        }
        Ok(cands)
    }

    fn state_prob(&mut self, one_hot: &[f32], patch: &[f32]) -> Result<f32> {
        // Input 0 is the one-hot label, input 1 the thermal patch.
        self.state.fill_input_f32(0, one_hot)?;
        self.state.fill_input_f32(1, patch)?;
        self.state.invoke()?;
        let (out, _) = self.state.output_f32(0)?;
        out.first().copied().context("state classifier produced no output")
    }

    fn set_variant(&mut self, variant: ModelVariant) {
        if variant != self.active {
            info!("vision: switching detector variant to {:?}", variant);
            self.active = variant;
        }
    }

    fn variant(&self) -> ModelVariant {
        self.active
    }
}
