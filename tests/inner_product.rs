//! Client/Server round trips without the collection layer
//!
//! genSecKey → genKeys → encryptKey / encryptQuery → cacheKeys / cacheQuery
//! → innerProduct → decryptScore → topKScore

use evd::client::Client;
use evd::message::Message;
use evd::params::EvdParams;
use evd::server::Server;
use evd::topk::TopK;

fn test_params() -> EvdParams {
    EvdParams::with_degree(256)
}

const SCALE: f64 = (1u64 << 22) as f64;

fn vectors(count: usize, dim: usize) -> Vec<Vec<f64>> {
    (0..count)
        .map(|n| {
            (0..dim)
                .map(|i| (((n * 37 + i * 11) % 29) as f64 - 14.0) / 20.0)
                .collect()
        })
        .collect()
}

fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

#[test]
fn test_encrypted_inner_products_and_top_k() {
    let log_rank = 4;
    let mut client = Client::with_seed(test_params(), log_rank, 31).unwrap();
    assert_eq!(client.get_rank(), 16);
    let secret = client.gen_sec_key().clone();

    let server = Server::new(
        log_rank,
        client.gen_relin_key(&secret).unwrap(),
        client.gen_auted_mod_pack_keys(&secret).unwrap(),
        client.gen_inv_auted_mod_pack_keys(&secret).unwrap(),
    )
    .unwrap();

    let keys = vectors(40, 12);
    let query = keys[17].clone();

    let cts = keys
        .iter()
        .map(|k| client.encrypt_key(&Message::from(k.clone()), SCALE))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let cached_keys = server.cache_keys(&cts).unwrap();
    let cached_query = server
        .cache_query(&client.encrypt_query(&Message::from(query.clone()), SCALE).unwrap())
        .unwrap();
    let score_ct = server.inner_product(&cached_query, &cached_keys).unwrap();

    let mut scores = vec![Message::default()];
    client
        .decrypt_score(&mut scores, &[score_ct], &secret, SCALE * SCALE)
        .unwrap();
    for (n, key) in keys.iter().enumerate() {
        assert!(
            (scores[0][n] - dot(&query, key)).abs() < 1e-2,
            "key {}: {} vs {}",
            n,
            scores[0][n],
            dot(&query, key)
        );
    }
    assert!(scores[0].as_slice()[keys.len()..].iter().all(|v| v.abs() < 1e-2));

    let truncated = Message::from(&scores[0].as_slice()[..keys.len()]);
    let mut top = TopK::new(3);
    client.top_k_score(&mut top, &[truncated]);
    let plain: Vec<f64> = keys.iter().map(|k| dot(&query, k)).collect();
    assert_eq!(top.indices()[0], evd::get_top_k_indices(&plain, 1)[0]);
}

#[test]
fn test_plaintext_query_matches_encrypted() {
    let log_rank = 3;
    let mut client = Client::with_seed(test_params(), log_rank, 32).unwrap();
    let secret = client.gen_sec_key().clone();
    let server = Server::new(
        log_rank,
        client.gen_relin_key(&secret).unwrap(),
        client.gen_auted_mod_pack_keys(&secret).unwrap(),
        client.gen_inv_auted_mod_pack_keys(&secret).unwrap(),
    )
    .unwrap();

    let (query_scale, key_scale) = ((1u64 << 16) as f64, (1u64 << 27) as f64);
    let keys = vectors(9, 8);
    let query = vectors(1, 8).remove(0);
    let cts = keys
        .iter()
        .map(|k| client.encrypt_key(&Message::from(k.clone()), key_scale))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let cached_keys = server.cache_keys(&cts).unwrap();
    let cached_query = server
        .cache_query_plain(&Message::from(query.clone()), query_scale)
        .unwrap();
    assert!(!cached_query.is_encrypted());

    let ct = server.inner_product(&cached_query, &cached_keys).unwrap();
    let scores = client.decrypt(&ct, &secret, query_scale * key_scale).unwrap();
    for (n, key) in keys.iter().enumerate() {
        assert!((scores[n] - dot(&query, key)).abs() < 1e-2);
    }
}

#[test]
fn test_rank_mismatch_is_rejected() {
    let mut small = Client::with_seed(test_params(), 2, 33).unwrap();
    let secret = small.gen_sec_key().clone();
    let server = Server::new(
        2,
        small.gen_relin_key(&secret).unwrap(),
        small.gen_auted_mod_pack_keys(&secret).unwrap(),
        small.gen_inv_auted_mod_pack_keys(&secret).unwrap(),
    )
    .unwrap();

    let mut large = Client::with_seed(test_params(), 4, 34).unwrap();
    large.set_secret_key(secret).unwrap();
    let query = large
        .encrypt_query(&Message::from(vec![0.5; 16]), SCALE)
        .unwrap();
    let err = server.cache_query(&query).unwrap_err();
    assert_eq!(err.kind(), evd::ErrorKind::CryptoState);
}
