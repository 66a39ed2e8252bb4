use hda_audio::format::{SUPPORTED_BITS, SUPPORTED_RATES};
use hda_audio::{HdaConfig, PcmSupport, StreamFormat};
use proptest::prelude::*;

proptest! {
    #[test]
    fn converter_format_round_trips(
        rate in prop::sample::select(SUPPORTED_RATES.to_vec()),
        bits in prop::sample::select(SUPPORTED_BITS.to_vec()),
        channels in 1u8..=16,
    ) {
        let format = StreamFormat::new(rate, bits, channels).unwrap();
        let fmt = format.to_hda_fmt().unwrap();
        prop_assert_eq!(fmt & (1 << 15), 0);
        prop_assert_eq!(StreamFormat::from_hda_fmt(fmt), Some(format));
    }

    #[test]
    fn pcm_mask_advertises_exactly_the_listed_values(
        rates in prop::sample::subsequence(SUPPORTED_RATES.to_vec(), 0..=SUPPORTED_RATES.len()),
        bits in prop::sample::subsequence(SUPPORTED_BITS.to_vec(), 0..=SUPPORTED_BITS.len()),
    ) {
        let pcm = PcmSupport::from_lists(&rates, &bits);
        prop_assert_eq!(pcm.rates().collect::<Vec<_>>(), rates);
        prop_assert_eq!(pcm.bit_depths().collect::<Vec<_>>(), bits);
    }
}

#[test]
fn partial_config_document_fills_in_defaults() {
    let config: HdaConfig =
        serde_json::from_str(r#"{ "block_size": 2048, "bdl_entries": 16 }"#).unwrap();
    assert_eq!(config.block_size, 2048);
    assert_eq!(config.bdl_entries, 16);
    assert_eq!(config.command_retries, HdaConfig::default().command_retries);
    config.validate().unwrap();

    assert!(serde_json::from_str::<HdaConfig>(r#"{ "volume": 3 }"#).is_err());
}
