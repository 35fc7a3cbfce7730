pub const FALLBACK_FLAG: &str = "🇪🇺";

/// ICAO 24-bit address blocks, checked in order. Bounds are inclusive.
const ICAO_BLOCKS: &[(u32, u32, &str)] = &[
    (0x300000, 0x33FFFF, "🇮🇹"),
    (0x340000, 0x37FFFF, "🇪🇸"),
    (0x380000, 0x3BFFFF, "🇫🇷"),
    (0x3C0000, 0x3FFFFF, "🇩🇪"),
    (0x400000, 0x43FFFF, "🇬🇧"),
    (0x448000, 0x44FFFF, "🇧🇪"),
    (0x480000, 0x487FFF, "🇳🇱"),
    (0x488000, 0x48FFFF, "🇵🇱"),
    (0x490000, 0x497FFF, "🇵🇹"),
    (0x4CA000, 0x4CAFFF, "🇮🇪"),
    (0xA00000, 0xAFFFFF, "🇺🇸"),
];

pub fn flag_for(hex: &str) -> &'static str {
    let Ok(addr) = u32::from_str_radix(hex.trim(), 16) else {
        return FALLBACK_FLAG;
    };
    ICAO_BLOCKS
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&addr))
        .map(|(_, _, flag)| *flag)
        .unwrap_or(FALLBACK_FLAG)
}
