use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Mean over unmasked tokens: `[B,T,H]` x `[B,T]` -> `[B,H]`.
pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    if hidden.dims().len() != 3 {
        bail!("hidden shape must be [B,T,H], got {:?}", hidden.dims());
    }
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_broadcast = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
    // All-padding rows would divide by zero.
    let lengths = lengths.maximum(1f32)?;
    Ok(sum.broadcast_div(&lengths)?)
}

/// Row-wise L2 normalization of a `[B,H]` tensor.
pub fn l2_normalize_rows(x: &Tensor) -> Result<Tensor> {
    let eps_val = match x.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], x.device())?.to_dtype(x.dtype())?.unsqueeze(0)?;
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.broadcast_add(&eps)?;
    Ok(x.broadcast_div(&norm)?)
}

pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    l2_normalize_rows(&masked_mean(hidden, attention_mask)?)
}
