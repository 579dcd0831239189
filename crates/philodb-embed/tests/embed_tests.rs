use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};
use philodb_core::config::EmbeddingConfig;
use philodb_embed::{embedder_from_config, load_weights, Embedder, FakeEmbedder};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let config = EmbeddingConfig { use_fake: true, fake_dim: 256, ..EmbeddingConfig::default() };
    let embedder = embedder_from_config(&config).expect("embedder");
    let texts = vec!["passage: hello world".to_string(), "passage: hello world".to_string()];
    let embs = embedder.encode_checked(&texts, true).expect("encode");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 256, "embedding dim follows config");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn fake_embedder_handles_empty_text() {
    let embedder = FakeEmbedder::new(32);
    let out = embedder.encode(&[String::new()], true).expect("encode");
    assert_eq!(out[0].len(), 32);
    assert!(out[0].iter().all(|x| x.is_finite()));
}

#[test]
fn fake_embedder_relates_shared_words() {
    let embedder = FakeEmbedder::new(1024);
    let texts: Vec<String> = ["query: What is justice?", "passage: Justice is fairness.", "passage: Bread rises slowly."]
        .iter().map(|s| s.to_string()).collect();
    let v = embedder.encode(&texts, true).expect("encode");
    let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    assert!(dot(&v[0], &v[1]) > dot(&v[0], &v[2]));
}

#[test]
fn unnormalized_output_keeps_magnitude() {
    let embedder = FakeEmbedder::new(64);
    let out = embedder.encode(&["a b c d e f g".to_string()], false).expect("encode");
    let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!(norm > 1.0);
}

#[test]
fn safetensors_weights_load_without_mapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let weight = Tensor::new(&[[1f32, 2.0], [3.0, 4.0]], &Device::Cpu).expect("tensor");
    let tensors: HashMap<String, Tensor> = [("pooler.weight".to_string(), weight)].into_iter().collect();
    candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).expect("save");

    let vb = load_weights(dir.path(), DType::F32, &Device::Cpu).expect("load");
    let loaded = vb.get((2, 2), "pooler.weight").expect("get");
    assert_eq!(loaded.to_vec2::<f32>().expect("vec"), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
}

#[test]
fn missing_weights_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_weights(dir.path(), DType::F32, &Device::Cpu).err().expect("no weights");
    assert!(err.to_string().contains("pytorch_model.bin"));
}
