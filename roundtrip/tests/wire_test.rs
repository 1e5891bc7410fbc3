use colf_roundtrip::{capped, demo, geo};
use colf_wire::{DecodeError, EncodeError, Message, Timestamp, DEPTH_MAX};
use proptest::prelude::*;

fn rich_kinds() -> demo::Kinds {
    demo::Kinds {
        on: true,
        i8: -128,
        i16: 300,
        i32: -70_000,
        i64: i64::MIN,
        u8: 255,
        u16: 65_535,
        u32: u32::MAX,
        u64: u64::MAX,
        f32: -0.0,
        f64: 1.5,
        at: Timestamp::new(-1, 999_999_999),
        name: "pizza 🍕".to_string(),
        blob: vec![0, 1, 2],
        flags: vec![true, false, true],
        nums: vec![0, -1, i64::MAX],
        ratios: vec![0.25],
        names: vec![String::new(), "ab".to_string()],
        blobs: vec![vec![], vec![9]],
        times: vec![Timestamp::default(), Timestamp::new(1_700_000_000, 5)],
    }
}

#[test]
fn test_point_encoding() {
    let point = demo::Point { x: 0, y: 5 };
    let data = point.marshal().unwrap();
    assert_eq!(data, [0x05, 0x0A]);
    assert_eq!(demo::Point::unmarshal(&data), Ok((point, 2)));
    assert_eq!(demo::Point { x: -1, y: 0 }.marshal().unwrap(), [0x03, 0x01]);
}

#[test]
fn test_zero_values() {
    assert_eq!(demo::Point::default().marshal().unwrap(), [0x00]);
    assert_eq!(demo::Kinds::default().marshal().unwrap(), [0x00]);
    assert_eq!(demo::Nothing::default().marshal().unwrap(), [0x00]);
    assert_eq!(demo::Kinds::unmarshal(&[0x00]), Ok((demo::Kinds::default(), 1)));

    // an all-default value struct is left out
    let route = demo::Route { name: "r".to_string(), ..Default::default() };
    assert_eq!(route.marshal().unwrap(), [0x03, 0x01, b'r']);
}

#[test]
fn test_bool_field_has_no_payload() {
    let kinds = demo::Kinds { on: true, ..Default::default() };
    assert_eq!(kinds.marshal().unwrap(), [0x03]);
}

#[test]
fn test_negative_zero_is_sent() {
    let kinds = demo::Kinds { f32: -0.0, ..Default::default() };
    let data = kinds.marshal().unwrap();
    assert_eq!(data, [0x15, 0x00, 0x00, 0x00, 0x80]);
    let (back, _) = demo::Kinds::unmarshal(&data).unwrap();
    assert!(back.f32.is_sign_negative());
}

#[test]
fn test_rich_round_trip() {
    let kinds = rich_kinds();
    let data = kinds.marshal().unwrap();
    assert_eq!(demo::Kinds::unmarshal(&data), Ok((kinds, data.len())));
}

#[test]
fn test_strict_prefixes_fail() {
    let data = rich_kinds().marshal().unwrap();
    for n in 0..data.len() {
        assert!(demo::Kinds::unmarshal(&data[..n]).is_err(), "prefix of {} bytes decoded", n);
    }
}

#[test]
fn test_cross_package_and_recursion() {
    let route = demo::Route {
        name:  "north".to_string(),
        stops: vec![geo::Point { lat: 52.1, lon: 4.3 }, geo::Point::default()],
        start: geo::Point { lat: -1.0, lon: 0.0 },
        next:  Some(Box::new(demo::Route {
            name: "south".to_string(),
            next: Some(Box::new(demo::Route::default())),
            ..Default::default()
        })),
        empty: demo::Nothing {},
    };
    let data = route.marshal().unwrap();
    assert_eq!(demo::Route::unmarshal(&data), Ok((route, data.len())));
}

#[test]
fn test_list_ceiling() {
    let route = demo::Route { stops: vec![geo::Point::default(); 4], ..Default::default() };
    assert_eq!(route.marshal(), Err(EncodeError::ListExceeded { count: 4, max: 3 }));

    let route = demo::Route { stops: vec![geo::Point::default(); 3], ..Default::default() };
    assert!(route.marshal().is_ok());

    // names allows 4 elements
    assert_eq!(
        demo::Kinds::unmarshal(&[0x25, 0x05, 0, 0, 0, 0, 0]),
        Err(DecodeError::ListExceeded { count: 5, max: 4 })
    );
}

#[test]
fn test_package_list_ceiling() {
    assert_eq!(capped::LIST_MAX, 3);

    let bag = capped::Bag { items: vec![1, 2, 3, 4], ..Default::default() };
    assert_eq!(bag.marshal(), Err(EncodeError::ListExceeded { count: 4, max: 3 }));
    let bag = capped::Bag { tags: vec![String::new(); 4], ..Default::default() };
    assert_eq!(bag.marshal(), Err(EncodeError::ListExceeded { count: 4, max: 3 }));

    let bag = capped::Bag { items: vec![1, 2, 3], ..Default::default() };
    let data = bag.marshal().unwrap();
    assert_eq!(data, [0x03, 0x03, 0x02, 0x04, 0x06]);
    assert_eq!(capped::Bag::unmarshal(&data), Ok((bag, 5)));

    assert_eq!(
        capped::Bag::unmarshal(&[0x03, 0x04, 0x02, 0x04, 0x06, 0x08]),
        Err(DecodeError::ListExceeded { count: 4, max: 3 })
    );
}

/// A chain of `levels` routes linked through `next`.
fn route_chain(levels: usize) -> demo::Route {
    let mut route = demo::Route::default();
    for _ in 1..levels {
        route = demo::Route { next: Some(Box::new(route)), ..Default::default() };
    }
    route
}

/// The serial of a chain of `levels` routes: a `next` header per link and an
/// empty struct at the end.
fn route_chain_serial(levels: usize) -> Vec<u8> {
    [vec![0x09; levels - 1], vec![0x00]].concat()
}

#[test]
fn test_deep_nesting_fails_without_overflow() {
    let data = route_chain_serial(60_001);
    assert!(data.len() < demo::SIZE_MAX);
    assert_eq!(demo::Route::unmarshal(&data), Err(DecodeError::DepthExceeded { max: DEPTH_MAX }));
}

#[test]
fn test_depth_ceiling() {
    let route = route_chain(DEPTH_MAX);
    let data = route.marshal().unwrap();
    assert_eq!(data, route_chain_serial(DEPTH_MAX));
    assert_eq!(demo::Route::unmarshal(&data), Ok((route, DEPTH_MAX)));

    assert_eq!(route_chain(DEPTH_MAX + 1).marshal(), Err(EncodeError::DepthExceeded { max: DEPTH_MAX }));
    assert_eq!(
        demo::Route::unmarshal(&route_chain_serial(DEPTH_MAX + 1)),
        Err(DecodeError::DepthExceeded { max: DEPTH_MAX })
    );
}

#[test]
fn test_field_size_ceiling() {
    let kinds = demo::Kinds { name: "x".repeat(17), ..Default::default() };
    assert_eq!(kinds.marshal(), Err(EncodeError::FieldSizeExceeded { len: 17, max: 16 }));

    let mut data = vec![0x1B, 17];
    data.extend_from_slice(&[b'x'; 17]);
    assert_eq!(demo::Kinds::unmarshal(&data), Err(DecodeError::FieldSizeExceeded { len: 17, max: 16 }));
}

#[test]
fn test_size_ceiling() {
    let kinds = demo::Kinds { blob: vec![7; demo::SIZE_MAX], ..Default::default() };
    assert!(matches!(kinds.marshal(), Err(EncodeError::SizeExceeded { max, .. }) if max == demo::SIZE_MAX));

    // a blob declared at the full ceiling, which the header bytes already eat into
    assert_eq!(
        demo::Kinds::unmarshal(&[0x1D, 0x80, 0x80, 0x04]),
        Err(DecodeError::SizeExceeded { max: demo::SIZE_MAX })
    );
    // a count within the ceiling but beyond the input
    assert_eq!(demo::Kinds::unmarshal(&[0x21, 0xE8, 0x07, 0x00]), Err(DecodeError::Truncated));
}

#[test]
fn test_malformed_headers() {
    assert_eq!(demo::Point::unmarshal(&[0x01]), Err(DecodeError::Header(0x01)));
    assert_eq!(demo::Point::unmarshal(&[0x07, 0x02]), Err(DecodeError::FieldIndex { index: 2, count: 2 }));
    assert_eq!(demo::Point::unmarshal(&[0x04, 0x0A, 0x03, 0x02]), Err(DecodeError::FieldOrder { index: 0 }));
    assert_eq!(demo::Nothing::unmarshal(&[0x03]), Err(DecodeError::FieldIndex { index: 0, count: 0 }));
    assert_eq!(demo::Point::unmarshal(&[]), Err(DecodeError::Truncated));
}

#[test]
fn test_malformed_values() {
    // i8 with a payload beyond 8 bits
    assert_eq!(demo::Kinds::unmarshal(&[0x05, 0x80, 0x02]), Err(DecodeError::Overflow { bits: 8 }));
    // flags holding the byte 2
    assert_eq!(demo::Kinds::unmarshal(&[0x1F, 0x01, 0x02]), Err(DecodeError::Bool(0x02)));
    // at with nanoseconds of a full second
    assert_eq!(
        demo::Kinds::unmarshal(&[0x19, 0x00, 0x80, 0x94, 0xEB, 0xDC, 0x03]),
        Err(DecodeError::Nanos(1_000_000_000))
    );
}

#[test]
fn test_trailing_data_is_left() {
    assert_eq!(demo::Point::unmarshal(&[0x05, 0x0A, 0xFF]), Ok((demo::Point { x: 0, y: 5 }, 2)));
}

fn timestamp() -> impl Strategy<Value = Timestamp> {
    (any::<i64>(), 0u32..1_000_000_000).prop_map(|(s, n)| Timestamp::new(s, n))
}

prop_compose! {
    fn kinds()(
        on in any::<bool>(),
        ints in (any::<i8>(), any::<i16>(), any::<i32>(), any::<i64>()),
        uints in (any::<u8>(), any::<u16>(), any::<u32>(), any::<u64>()),
        single in prop::num::f32::NORMAL | prop::num::f32::ZERO,
        double in prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::INFINITE,
        at in timestamp(),
        name in "\\PC{0,4}",
        blob in prop::collection::vec(any::<u8>(), 0..8),
        flags in prop::collection::vec(any::<bool>(), 0..4),
        nums in prop::collection::vec(any::<i64>(), 0..4),
        names in prop::collection::vec("[a-z]{0,8}", 0..=4),
        times in prop::collection::vec(timestamp(), 0..3),
    ) -> demo::Kinds {
        demo::Kinds {
            on,
            i8: ints.0, i16: ints.1, i32: ints.2, i64: ints.3,
            u8: uints.0, u16: uints.1, u32: uints.2, u64: uints.3,
            f32: single, f64: double, at, name, blob: blob.clone(), flags, nums,
            ratios: vec![single],
            names,
            blobs: vec![blob],
            times,
        }
    }
}

proptest! {
    #[test]
    fn test_round_trip(kinds in kinds()) {
        let data = kinds.marshal().unwrap();
        prop_assert_eq!(demo::Kinds::unmarshal(&data), Ok((kinds, data.len())));
    }

    #[test]
    fn test_arbitrary_input_never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = demo::Route::unmarshal(&data);
        let _ = demo::Kinds::unmarshal(&data);
    }
}
