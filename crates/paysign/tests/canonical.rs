use serde_json::json;

use paysign::{
    ArrayPolicy, CanonicalizationOptions, GatewayProfile, ParameterSet, PaysignError, canonicalize,
};

fn options() -> CanonicalizationOptions {
    CanonicalizationOptions::new().with_array_policy(ArrayPolicy::Skip)
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            result.push(tail);
        }
    }
    result
}

#[test]
fn insertion_order_does_not_change_canonical_form() {
    let entries = [
        ("total_amount", "10.00"),
        ("appid", "2017"),
        ("out_trade_no", "A1"),
        ("subject", "coffee"),
    ];
    let expected = "appid=2017&out_trade_no=A1&subject=coffee&total_amount=10.00";

    for ordering in permutations(&entries) {
        let params: ParameterSet = ordering.into_iter().collect();
        assert_eq!(canonicalize(&params, &options()).unwrap().as_str(), expected);
    }
}

#[test]
fn empty_values_never_appear() {
    let params = ParameterSet::new()
        .with("appid", "2017")
        .with("attach", "")
        .with("detail", json!(null))
        .with("out_trade_no", "A1");
    let canonical = canonicalize(&params, &options()).unwrap();
    assert_eq!(canonical.as_str(), "appid=2017&out_trade_no=A1");
    assert!(!canonical.as_str().contains("attach"));
}

#[test]
fn reference_example() {
    let params = ParameterSet::new()
        .with("appid", "2017")
        .with("out_trade_no", "A1")
        .with("total_amount", "10.00");
    let canonical = canonicalize(&params, &CanonicalizationOptions::new()).unwrap();
    assert_eq!(canonical.as_str(), "appid=2017&out_trade_no=A1&total_amount=10.00");
}

#[test]
fn repeated_runs_are_byte_identical() {
    let params = ParameterSet::new()
        .with("b", "x y")
        .with("a", json!(1))
        .with("c", "z&w");
    let first = canonicalize(&params, &options().url_encoded()).unwrap();
    for _ in 0..10 {
        assert_eq!(canonicalize(&params, &options().url_encoded()).unwrap(), first);
    }
}

#[test]
fn nested_values_follow_the_declared_policy() {
    let params = ParameterSet::new()
        .with("goods_detail", json!([{"goods_id": "G1", "quantity": 1}]))
        .with("out_trade_no", "A1");

    assert!(matches!(
        canonicalize(&params, &CanonicalizationOptions::new()),
        Err(PaysignError::Validation(_))
    ));
    assert_eq!(
        canonicalize(&params, &options()).unwrap().as_str(),
        "out_trade_no=A1"
    );
    let flattened = CanonicalizationOptions::new().with_array_policy(ArrayPolicy::Flatten);
    assert_eq!(
        canonicalize(&params, &flattened).unwrap().as_str(),
        r#"goods_detail=[{"goods_id":"G1","quantity":1}]&out_trade_no=A1"#
    );
}

#[test]
fn gateway_profiles_decode_or_keep_raw_values() {
    let params = ParameterSet::new()
        .with("notify_url", "https%3A%2F%2Fshop.example%2Fnotify")
        .with("out_trade_no", "A1");

    let alipay = canonicalize(&params, &GatewayProfile::alipay().options).unwrap();
    assert_eq!(
        alipay.as_str(),
        "notify_url=https://shop.example/notify&out_trade_no=A1"
    );

    let unionpay = canonicalize(&params, &GatewayProfile::unionpay().options).unwrap();
    assert_eq!(
        unionpay.as_str(),
        "notify_url=https%3A%2F%2Fshop.example%2Fnotify&out_trade_no=A1"
    );
}

#[test]
fn reserved_keys_are_rejected() {
    let params = ParameterSet::new().with("appid", "2017").with("sign", "deadbeef");
    assert!(matches!(
        canonicalize(&params, &options()),
        Err(PaysignError::Validation(_))
    ));
}
