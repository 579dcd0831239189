use candle_core::{Device, Tensor};
use philodb_embed::{masked_mean, masked_mean_l2};

fn rows(t: &Tensor) -> Vec<Vec<f32>> {
    t.to_vec2().expect("[B,H] tensor")
}

#[test]
fn padded_tokens_do_not_shift_the_mean() {
    // batch of two: row 0 has one real token, row 1 has two
    let hidden = Tensor::from_slice(
        &[3.0f32, 4.0, 100.0, 100.0, 1.0, 2.0, 3.0, 6.0],
        (2, 2, 2),
        &Device::Cpu,
    )
    .expect("hidden");
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &Device::Cpu).expect("mask");

    assert_eq!(rows(&masked_mean(&hidden, &mask).expect("mean")), vec![vec![3.0, 4.0], vec![2.0, 4.0]]);

    let unit = rows(&masked_mean_l2(&hidden, &mask).expect("mean l2"));
    assert!((unit[0][0] - 0.6).abs() < 1e-6 && (unit[0][1] - 0.8).abs() < 1e-6);
    let n = unit[1].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((n - 1.0).abs() < 1e-5);
}

#[test]
fn all_padding_row_is_zero_not_nan() {
    let hidden = Tensor::from_slice(&[5.0f32, 7.0], (1, 1, 2), &Device::Cpu).expect("hidden");
    let mask = Tensor::from_slice(&[0u32], (1, 1), &Device::Cpu).expect("mask");
    let out = rows(&masked_mean(&hidden, &mask).expect("mean"));
    assert_eq!(out, vec![vec![0.0, 0.0]]);
}

#[test]
fn rank_two_hidden_is_rejected() {
    let hidden = Tensor::from_slice(&[1.0f32, 2.0], (1, 2), &Device::Cpu).expect("hidden");
    let mask = Tensor::from_slice(&[1u32, 1], (1, 2), &Device::Cpu).expect("mask");
    assert!(masked_mean(&hidden, &mask).is_err());
}
