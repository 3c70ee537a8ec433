use super::*;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

#[test]
fn test_max_amount_is_numeric_19_4_ceiling() {
    assert_eq!(MAX_AMOUNT, dec!(999999999999999.9999));
    assert_eq!(MAX_AMOUNT.scale(), AMOUNT_SCALE);
}

#[rstest]
#[case("usd", "USD")]
#[case("USD", "USD")]
#[case(" eur ", "EUR")]
#[case("Jpy", "JPY")]
fn test_currency_code_normalizes(#[case] input: &str, #[case] expected: &str) {
    let code = CurrencyCode::from_str(input).unwrap();
    assert_eq!(code.as_str(), expected);
    assert_eq!(code.to_string(), expected);
}

#[rstest]
#[case("")]
#[case("US")]
#[case("USDT")]
#[case("U$D")]
#[case("12A")]
fn test_currency_code_rejects_malformed(#[case] input: &str) {
    assert!(CurrencyCode::from_str(input).is_err());
}

#[test]
fn test_currency_code_serde_round_trip_as_string() {
    let json = serde_json::to_string(&CurrencyCode::USD).unwrap();
    assert_eq!(json, "\"USD\"");
    let parsed: CurrencyCode = serde_json::from_str("\"eur\"").unwrap();
    assert_eq!(parsed, CurrencyCode::EUR);
    assert!(serde_json::from_str::<CurrencyCode>("\"EURO\"").is_err());
}

#[rstest]
#[case("200.00", dec!(200.00))]
#[case("0.0001", dec!(0.0001))]
#[case(" 42 ", dec!(42))]
#[case("-5.5", dec!(-5.5))]
fn test_parse_amount_exact(#[case] input: &str, #[case] expected: Decimal) {
    assert_eq!(parse_amount(input).unwrap(), expected);
}

#[test]
fn test_parse_amount_keeps_scale() {
    assert_eq!(parse_amount("300.00").unwrap().scale(), 2);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("1e3")]
#[case("1.5E-2")]
#[case("abc")]
#[case("1.2.3")]
fn test_parse_amount_rejects(#[case] input: &str) {
    assert!(parse_amount(input).is_err());
}
