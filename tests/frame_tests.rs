//! Unit tests for the `frame` module: parsing, packing and wire-order
//! conversion of LoRaWAN PHY payloads.

use lorawan_ns::lorawan::frame::{
    encode_data_frame, encode_join_accept, mhdr_byte, parse_data_frame, parse_join_request,
    split_mic, AppNonce, DevAddr, Eui, FCtrl, MType,
};

/// Community test vector: unconfirmed uplink, DevAddr 01020304, ADR set,
/// FCnt 1, FPort 1, 5-byte payload.
fn phy_dataup_payload() -> Vec<u8> {
    vec![
        0x40, 0x04, 0x03, 0x02, 0x01, 0x80, 0x01, 0x00, 0x01, 0xa6, 0x94, 0x64, 0x26, 0x15, 0xd6,
        0xc3, 0xb5, 0x82,
    ]
}

/// Community test vector: join-request with DevNonce 0x102d.
fn phy_join_request_payload() -> Vec<u8> {
    vec![
        0x00, 0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01, 0x05, 0x04, 0x03, 0x02, 0x05, 0x04,
        0x03, 0x02, 0x2d, 0x10, 0x6a, 0x99, 0x0e, 0x12,
    ]
}

/// Community test vector: uplink carrying three FOpts bytes and no FPort.
fn phy_dataup_with_fopts() -> Vec<u8> {
    vec![
        0x40, 0x04, 0x03, 0x02, 0x01, 0x03, 0x00, 0x00, 0x02, 0x03, 0x05, 0xd7, 0xfa, 0x0c, 0x6c,
    ]
}

/// Tests that a data uplink is correctly split and parsed.
#[test]
fn test_parse_data_uplink() {
    let phy = phy_dataup_payload();
    let (msg, mic) = split_mic(&phy).unwrap();
    assert_eq!(mic, [0xd6, 0xc3, 0xb5, 0x82]);

    let frame = parse_data_frame(msg).unwrap();
    assert_eq!(frame.mtype, MType::UnconfirmedDataUp);
    assert_eq!(frame.devaddr, DevAddr::new(0x01020304));
    assert!(frame.fctrl.adr);
    assert!(!frame.fctrl.ack);
    assert!(!frame.fctrl.adr_ack_req);
    assert_eq!(frame.fcnt, 1);
    assert!(frame.fopts.is_empty());
    assert_eq!(frame.fport, Some(1));
    assert_eq!(frame.frm_payload, vec![0xa6, 0x94, 0x64, 0x26, 0x15]);
}

/// Tests that FOpts bytes are carved out and FPort may be absent.
#[test]
fn test_parse_data_uplink_with_fopts() {
    let phy = phy_dataup_with_fopts();
    let (msg, _) = split_mic(&phy).unwrap();
    let frame = parse_data_frame(msg).unwrap();
    assert_eq!(frame.fctrl.fopts_len, 3);
    assert_eq!(frame.fopts, vec![0x02, 0x03, 0x05]);
    assert_eq!(frame.fport, None);
    assert!(frame.frm_payload.is_empty());
}

/// Tests that a join-request parses with identifiers in canonical order.
#[test]
fn test_parse_join_request() {
    let phy = phy_join_request_payload();
    let (msg, mic) = split_mic(&phy).unwrap();
    assert_eq!(mic, [0x6a, 0x99, 0x0e, 0x12]);

    let request = parse_join_request(msg).unwrap();
    assert_eq!(request.appeui, Eui::new([1, 2, 3, 4, 1, 2, 3, 4]));
    assert_eq!(request.deveui, Eui::new([2, 3, 4, 5, 2, 3, 4, 5]));
    assert_eq!(*request.devnonce.as_bytes(), [0x2d, 0x10]);
    assert_eq!(request.devnonce.to_string(), "102d");
}

/// Tests that the downlink encoder reproduces the community vector's
/// header layout byte for byte.
#[test]
fn test_encode_data_downlink_header() {
    let frm_payload = [0x0a, 0xf1, 0xa3, 0x6a, 0x05, 0xd0, 0x12, 0x5f, 0x88, 0x5d];
    let msg = encode_data_frame(
        MType::ConfirmedDataDown,
        DevAddr::new(0x01020304),
        FCtrl { adr: true, adr_ack_req: false, ack: false, fpending: false, fopts_len: 0 },
        0x2aff,
        &[],
        Some(42),
        &frm_payload,
    );
    assert_eq!(
        msg,
        vec![
            0xa0, 0x04, 0x03, 0x02, 0x01, 0x80, 0xff, 0x2a, 0x2a, 0x0a, 0xf1, 0xa3, 0x6a, 0x05,
            0xd0, 0x12, 0x5f, 0x88, 0x5d,
        ]
    );
}

/// Tests that a frame without FPort encodes no payload section at all.
#[test]
fn test_encode_data_frame_without_port() {
    let msg = encode_data_frame(
        MType::UnconfirmedDataDown,
        DevAddr::new(0x01020304),
        FCtrl { ack: true, fopts_len: 2, ..FCtrl::default() },
        7,
        &[0x02, 0x30],
        None,
        &[],
    );
    assert_eq!(msg, vec![0x60, 0x04, 0x03, 0x02, 0x01, 0x22, 0x07, 0x00, 0x02, 0x30]);
}

/// Tests the join-accept MACPayload layout.
#[test]
fn test_encode_join_accept_layout() {
    let payload = encode_join_accept(
        AppNonce::new([0xAA, 0xBB, 0xCC]),
        [0x00, 0x00, 0x24],
        DevAddr::new(0x489A0B1C),
        0,
        3,
        1,
    );
    assert_eq!(
        payload,
        vec![0xAA, 0xBB, 0xCC, 0x00, 0x00, 0x24, 0x1C, 0x0B, 0x9A, 0x48, 0x03, 0x01]
    );
}

/// Tests that impossible lengths are parse errors, not panics.
#[test]
fn test_malformed_frames_fail() {
    // too short for MHDR + MIC
    assert!(split_mic(&[0x40, 0x01, 0x02, 0x03]).is_err());

    // below the data-frame minimum
    let (msg, _) = split_mic(&[0x40, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01]).unwrap();
    assert!(parse_data_frame(msg).is_err());

    // FOptsLen pointing past the end of the frame
    let phy = vec![0x40, 0x04, 0x03, 0x02, 0x01, 0x0F, 0x01, 0x00, 0xde, 0xad, 0xbe, 0xef];
    let (msg, _) = split_mic(&phy).unwrap();
    assert!(parse_data_frame(msg).is_err());

    // join-request with a truncated body
    let truncated = phy_join_request_payload()[..20].to_vec();
    let (msg, _) = split_mic(&truncated).unwrap();
    assert!(parse_join_request(msg).is_err());
}

/// Tests MHDR construction against the parser.
#[test]
fn test_mhdr_roundtrip() {
    for mtype in [
        MType::JoinRequest,
        MType::JoinAccept,
        MType::UnconfirmedDataUp,
        MType::UnconfirmedDataDown,
        MType::ConfirmedDataUp,
        MType::ConfirmedDataDown,
    ] {
        assert_eq!(MType::try_from(mhdr_byte(mtype)).unwrap(), mtype);
    }
}
