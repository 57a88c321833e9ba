//! ONNX Runtime 重建后端 (ONNX reconstructor)
//!
//! 模型输入 (1, T, F), 输出同形状的重建结果。
//! 输入/输出按位置绑定, 不依赖导出时的张量名称。

use std::path::Path;

use ndarray::Array2;
use ort::session::Session;
use tracing::info;

use super::autoencoder::Reconstructor;
use crate::error::{SentinelError, SentinelResult};

pub struct OnnxReconstructor {
    session: Session,
}

impl OnnxReconstructor {
    pub fn new<P: AsRef<Path>>(path: P) -> SentinelResult<Self> {
        let path = path.as_ref();
        info!("🧠 加载异常评分模型: {}", path.display());
        let session = Session::builder()?.commit_from_file(path)?;
        Ok(Self { session })
    }
}

impl Reconstructor for OnnxReconstructor {
    fn reconstruct(&mut self, input: &Array2<f32>) -> SentinelResult<Array2<f32>> {
        let (t, f) = input.dim();
        let shape: Vec<i64> = vec![1, t as i64, f as i64];
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = ort::value::Tensor::from_array((shape, data))?;

        let outputs = self.session.run(ort::inputs![tensor])?;
        let output = outputs
            .iter()
            .next()
            .map(|(_, v)| v)
            .ok_or_else(|| SentinelError::scorer("model produced no output"))?;
        let (out_shape, out_data) = output.try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
        if out_data.len() != t * f {
            return Err(SentinelError::shape_mismatch(vec![1, t, f], dims));
        }
        Array2::from_shape_vec((t, f), out_data.to_vec())
            .map_err(|e| SentinelError::scorer(format!("reconstruction shape: {}", e)))
    }
}
