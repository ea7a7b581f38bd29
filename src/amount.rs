use anyhow::{anyhow, Context, Result};
use ethers::types::U256;
use ethers::utils::{format_units, parse_units};

/// Values below this many leading fractional zeros print in positional form;
/// anything smaller switches to scientific notation.
const MAX_POSITIONAL_LEADING_ZEROS: usize = 5;

/// True for amounts that should not trigger a quote: empty, a lone decimal
/// point, or numerically zero.
pub fn is_empty_or_zero(amount: &str) -> bool {
    let amount = amount.trim();
    if amount.is_empty() || amount == "." {
        return true;
    }
    let mut saw_digit = false;
    for c in amount.chars() {
        match c {
            '0' => saw_digit = true,
            '.' => {}
            _ => return false,
        }
    }
    saw_digit
}

/// Converts a user-entered decimal string into base units.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256> {
    let parsed = parse_units(amount.trim(), u32::from(decimals))
        .with_context(|| {
            format!("unable to parse amount `{}` with {} decimals", amount, decimals)
        })?;
    Ok(parsed.into())
}

/// Renders a base-unit amount as a decimal string.
///
/// Trailing zeros are dropped. Amounts smaller than `1e-6` use scientific
/// notation, e.g. `1000000000` at 18 decimals becomes `"1e-9"`. Every
/// significant digit of the input is kept.
pub fn format_token_amount(raw: U256, decimals: u8) -> Result<String> {
    let formatted = format_units(raw, u32::from(decimals))
        .map_err(|err| anyhow!("unable to format {} with {} decimals: {}", raw, decimals, err))?;

    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, fraction.trim_end_matches('0')),
        None => (formatted.as_str(), ""),
    };

    if fraction.is_empty() {
        return Ok(integer.to_string());
    }
    if integer != "0" {
        return Ok(format!("{}.{}", integer, fraction));
    }

    let significant = fraction.trim_start_matches('0');
    let leading_zeros = fraction.len() - significant.len();
    if leading_zeros <= MAX_POSITIONAL_LEADING_ZEROS {
        return Ok(format!("0.{}", fraction));
    }

    let (first, rest) = significant.split_at(1);
    let exponent = leading_zeros + 1;
    if rest.is_empty() {
        Ok(format!("{}e-{}", first, exponent))
    } else {
        Ok(format!("{}.{}e-{}", first, rest, exponent))
    }
}
