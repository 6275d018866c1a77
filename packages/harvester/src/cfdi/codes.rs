//! Normalisation of coded CFDI values and the CFDI-usage catalogue.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// A short catalogue code followed by a human-readable label, e.g.
/// "PUE - Pago en una sola exhibición" or "01 Efectivo". Without a dash or
/// colon the code must contain a digit, so uppercase prose is left alone.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static CODE_WITH_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([A-Z0-9]{2,4})\s*[-:]\s*|(\d{2,3}|[A-Z]{1,2}\d{2})\s+)\S")
        .expect("valid regex")
});

/// Reduce a coded value to its bare code.
///
/// Values without an attached label are returned trimmed and unchanged.
///
/// # Examples
/// ```
/// use cfdi_harvester::cfdi::bare_code;
///
/// assert_eq!(bare_code("PUE - Pago en una sola exhibición"), "PUE");
/// assert_eq!(bare_code("01 Efectivo"), "01");
/// assert_eq!(bare_code(" G03 "), "G03");
/// ```
pub fn bare_code(value: &str) -> &str {
    let trimmed = value.trim();
    CODE_WITH_LABEL
        .captures(trimmed)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map_or(trimmed, |m| m.as_str())
}

/// Normalise a tax-type value to its catalogue code (`001`, `002`, `003`).
///
/// 3.2 documents name the tax instead of coding it.
pub fn tax_code(value: &str) -> &str {
    let code = bare_code(value);
    match code.to_uppercase().as_str() {
        "ISR" => "001",
        "IVA" => "002",
        "IEPS" => "003",
        _ => code,
    }
}

/// One entry of the CFDI-usage catalogue (c_UsoCFDI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageInfo {
    pub code: &'static str,
    /// Official catalogue description.
    pub description: &'static str,
    pub category: &'static str,
    pub tax_implication: &'static str,
    pub guide: &'static str,
}

const fn usage(
    code: &'static str,
    description: &'static str,
    category: &'static str,
    tax_implication: &'static str,
    guide: &'static str,
) -> UsageInfo {
    UsageInfo {
        code,
        description,
        category,
        tax_implication,
        guide,
    }
}

const OPERATING_EXPENSE: &str = "Operating expense";
const FIXED_ASSET: &str = "Investment (fixed asset)";
const SPECIAL: &str = "Special";

static USAGE_CATALOG: &[UsageInfo] = &[
    usage(
        "G01",
        "Adquisición de mercancías",
        OPERATING_EXPENSE,
        "Deductible as cost of sales",
        "Inventory purchased for resale.",
    ),
    usage(
        "G02",
        "Devoluciones, descuentos o bonificaciones",
        OPERATING_EXPENSE,
        "Deduction (credit note)",
        "Credit notes related to merchandise.",
    ),
    usage(
        "G03",
        "Gastos en general",
        OPERATING_EXPENSE,
        "Deductible",
        "General deductible operating expenses (stationery, power, rent, services).",
    ),
    usage(
        "I01",
        "Construcciones",
        FIXED_ASSET,
        "Depreciable",
        "Buildings or extensions.",
    ),
    usage(
        "I02",
        "Mobiliario y equipo de oficina por inversiones",
        FIXED_ASSET,
        "Depreciable",
        "Desks, chairs, filing cabinets.",
    ),
    usage(
        "I03",
        "Equipo de transporte",
        FIXED_ASSET,
        "Depreciable (capped)",
        "Cars and cargo trucks.",
    ),
    usage(
        "I04",
        "Equipo de cómputo y accesorios",
        FIXED_ASSET,
        "Depreciable",
        "Laptops, servers, printers.",
    ),
    usage(
        "I05",
        "Dados, troqueles, moldes, matrices y herramental",
        FIXED_ASSET,
        "Depreciable",
        "Specialised manufacturing tools.",
    ),
    usage(
        "I06",
        "Comunicaciones telefónicas",
        FIXED_ASSET,
        "Depreciable",
        "Telephone infrastructure.",
    ),
    usage(
        "I07",
        "Comunicaciones satelitales",
        FIXED_ASSET,
        "Depreciable",
        "Satellite reception equipment.",
    ),
    usage(
        "I08",
        "Otra maquinaria y equipo",
        FIXED_ASSET,
        "Depreciable",
        "Machinery outside the other investment codes.",
    ),
    usage(
        "S01",
        "Sin efectos fiscales",
        SPECIAL,
        "Not deductible",
        "Non-deductible expenses, sales to the general public, foreign residents.",
    ),
    usage(
        "CP01",
        "Pagos",
        SPECIAL,
        "Administrative",
        "Payment receipt complement only.",
    ),
    usage(
        "CN01",
        "Nómina",
        SPECIAL,
        "Deductible (payroll)",
        "Payroll receipts only.",
    ),
];

/// Look up a CFDI-usage code. Labels attached to the code are ignored.
///
/// # Examples
/// ```
/// use cfdi_harvester::cfdi::cfdi_usage_info;
///
/// let info = cfdi_usage_info("G03 - Gastos en general").unwrap();
/// assert_eq!(info.code, "G03");
/// assert!(cfdi_usage_info("ZZ99").is_none());
/// ```
pub fn cfdi_usage_info(code: &str) -> Option<&'static UsageInfo> {
    let code = bare_code(code).to_uppercase();
    USAGE_CATALOG.iter().find(|info| info.code == code)
}
