//! CFDI XML → [`InvoiceRecord`].
//!
//! Versions 3.2, 3.3 and 4.0 are read through the same owned tree. Element
//! lookups go through [`Element::lookup`], so a block that appears once or
//! several times resolves the same way.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::DocumentError;
use crate::types::{DocumentType, GlobalInformation, InvoiceRecord, Party, TaxBreakdown};
use crate::xml::{strip_bom, Element};

use super::codes::{bare_code, tax_code};

/// Namespace of CFDI 3.2 and 3.3.
pub const CFDI_NS_3: &str = "http://www.sat.gob.mx/cfd/3";

/// Namespace of CFDI 4.0.
pub const CFDI_NS_4: &str = "http://www.sat.gob.mx/cfd/4";

const ROOT_ELEMENT: &str = "Comprobante";

/// Lexical form of an `xs:decimal` amount.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DECIMAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("valid regex"));

/// Parse one raw CFDI document.
///
/// # Returns
/// * `Ok(Some(record))` for a stamped document
/// * `Ok(None)` when the document carries no valid stamp UUID
/// * `Err(_)` when the document is malformed (bad XML, unknown namespace,
///   missing mandatory attributes, unparseable numbers or dates)
pub fn parse(raw: &[u8]) -> Result<Option<InvoiceRecord>, DocumentError> {
    let text = strip_bom(std::str::from_utf8(raw)?);
    let root = Element::parse(text)?;

    let namespace = root.namespace.as_deref().unwrap_or_default();
    if root.name != ROOT_ELEMENT || !matches!(namespace, CFDI_NS_3 | CFDI_NS_4) {
        return Err(DocumentError::UnknownNamespace {
            element: root.name.clone(),
            namespace: namespace.to_string(),
        });
    }

    let Some((uuid, stamped_at)) = stamp(&root)? else {
        tracing::debug!("document has no stamp UUID, excluded");
        return Ok(None);
    };

    let version = required(&root, &["Version", "version"])?.to_string();
    let issued_at = date_time("Fecha", required(&root, &["Fecha", "fecha"])?)?;
    let document_type = document_type(&root)?;

    let subtotal = amount(&root, &["SubTotal", "subTotal"])?;
    let discount = amount(&root, &["Descuento", "descuento"])?;
    let total = amount(&root, &["Total", "total"])?;

    let receiver_node = root.first(&["Receptor"]);
    let description = root
        .first(&["Conceptos", "Concepto"])
        .and_then(|concept| optional(concept, &["Descripcion", "descripcion"]));

    Ok(Some(InvoiceRecord {
        uuid,
        issued_at,
        stamped_at,
        version,
        document_type,
        series: optional(&root, &["Serie", "serie"]),
        folio: optional(&root, &["Folio", "folio"]),
        subtotal,
        discount,
        tax: total - (subtotal - discount),
        total,
        taxes: tax_breakdown(&root)?,
        issuer: issuer(&root)?,
        receiver: receiver(&root)?,
        // 3.2 names the payment instrument `metodoDePago`
        payment_form: coded(&root, &["FormaPago", "metodoDePago"]),
        payment_method: payment_method(&root),
        cfdi_usage: receiver_node.and_then(|r| coded(r, &["UsoCFDI", "usoCFDI"])),
        payment_terms: optional(&root, &["CondicionesDePago", "condicionesDePago"]),
        description,
        currency: optional(&root, &["Moneda", "moneda"]),
        exchange_rate: optional_amount(&root, &["TipoCambio", "tipoCambio"])?,
        exportation: coded(&root, &["Exportacion"]),
        global: global_information(&root)?,
        raw_xml: text.to_string(),
    }))
}

/// Stamp UUID and stamping date from the first `TimbreFiscalDigital` with a
/// valid UUID, wherever `Complemento` repeats.
fn stamp(root: &Element) -> Result<Option<(Uuid, Option<NaiveDateTime>)>, DocumentError> {
    let Some(stamps) = root.lookup(&["Complemento", "TimbreFiscalDigital"]) else {
        return Ok(None);
    };

    for candidate in stamps.iter() {
        let Some(uuid) = candidate
            .attr_any(&["UUID"])
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            continue;
        };
        let stamped_at = candidate
            .attr_any(&["FechaTimbrado"])
            .map(|value| date_time("FechaTimbrado", value))
            .transpose()?;
        return Ok(Some((uuid, stamped_at)));
    }
    Ok(None)
}

fn document_type(root: &Element) -> Result<DocumentType, DocumentError> {
    let raw = required(root, &["TipoDeComprobante", "tipoDeComprobante"])?;
    DocumentType::from_code(bare_code(raw)).ok_or_else(|| DocumentError::InvalidCode {
        attribute: "TipoDeComprobante".to_string(),
        value: raw.to_string(),
    })
}

fn issuer(root: &Element) -> Result<Party, DocumentError> {
    let node = root
        .first(&["Emisor"])
        .ok_or_else(|| missing("Emisor", "Rfc"))?;

    // 3.2 carries the regime as a child element instead of an attribute
    let tax_regime = coded(node, &["RegimenFiscal"]).or_else(|| {
        node.first(&["RegimenFiscal"])
            .and_then(|regime| coded(regime, &["Regimen"]))
    });

    Ok(Party {
        rfc: party_rfc(node)?,
        name: optional(node, &["Nombre", "nombre"]),
        tax_regime,
    })
}

fn receiver(root: &Element) -> Result<Party, DocumentError> {
    let node = root
        .first(&["Receptor"])
        .ok_or_else(|| missing("Receptor", "Rfc"))?;

    Ok(Party {
        rfc: party_rfc(node)?,
        name: optional(node, &["Nombre", "nombre"]),
        tax_regime: coded(node, &["RegimenFiscalReceptor"]),
    })
}

fn party_rfc(node: &Element) -> Result<String, DocumentError> {
    node.attr_any(&["Rfc", "rfc"])
        .map(str::to_uppercase)
        .ok_or_else(|| missing(&node.name, "Rfc"))
}

/// Document-level taxes, summed per tax-type code.
fn tax_breakdown(root: &Element) -> Result<TaxBreakdown, DocumentError> {
    let mut taxes = TaxBreakdown::default();

    if let Some(transfers) = root.lookup(&["Impuestos", "Traslados", "Traslado"]) {
        for transfer in transfers.iter() {
            let value = amount(transfer, &["Importe", "importe"])?;
            match transfer.attr_any(&["Impuesto", "impuesto"]).map(tax_code) {
                Some("002") => taxes.transferred_vat += value,
                Some("003") => taxes.transferred_ieps += value,
                _ => {}
            }
        }
    }

    if let Some(withholdings) = root.lookup(&["Impuestos", "Retenciones", "Retencion"]) {
        for withholding in withholdings.iter() {
            let value = amount(withholding, &["Importe", "importe"])?;
            match withholding.attr_any(&["Impuesto", "impuesto"]).map(tax_code) {
                Some("001") => taxes.withheld_isr += value,
                Some("002") => taxes.withheld_vat += value,
                _ => {}
            }
        }
    }

    Ok(taxes)
}

fn global_information(root: &Element) -> Result<Option<GlobalInformation>, DocumentError> {
    let Some(node) = root.first(&["InformacionGlobal"]) else {
        return Ok(None);
    };

    let year = required(node, &["Año"])?;
    let fiscal_year = year
        .parse::<i32>()
        .map_err(|_| DocumentError::InvalidNumber {
            attribute: "Año".to_string(),
            value: year.to_string(),
        })?;

    Ok(Some(GlobalInformation {
        periodicity: bare_code(required(node, &["Periodicidad"])?).to_string(),
        months: bare_code(required(node, &["Meses"])?).to_string(),
        fiscal_year,
    }))
}

fn missing(element: &str, attribute: &str) -> DocumentError {
    DocumentError::MissingAttribute {
        element: element.to_string(),
        attribute: attribute.to_string(),
    }
}

fn required<'a>(node: &'a Element, names: &[&str]) -> Result<&'a str, DocumentError> {
    node.attr_any(names)
        .ok_or_else(|| missing(&node.name, names.first().copied().unwrap_or_default()))
}

fn optional(node: &Element, names: &[&str]) -> Option<String> {
    node.attr_any(names).map(str::to_string)
}

fn coded(node: &Element, names: &[&str]) -> Option<String> {
    node.attr_any(names).map(|value| bare_code(value).to_string())
}

/// Decimal attribute: zero when absent, an error when present but malformed.
fn amount(node: &Element, names: &[&str]) -> Result<Decimal, DocumentError> {
    Ok(optional_amount(node, names)?.unwrap_or(Decimal::ZERO))
}

fn optional_amount(node: &Element, names: &[&str]) -> Result<Option<Decimal>, DocumentError> {
    // Blank counts as present: only a missing attribute defaults
    let Some((attribute, raw)) = names
        .iter()
        .find_map(|name| node.attr(name).map(|value| (*name, value)))
    else {
        return Ok(None);
    };

    let invalid = || DocumentError::InvalidNumber {
        attribute: attribute.to_string(),
        value: raw.to_string(),
    };
    let value = raw.trim();
    if !DECIMAL_PATTERN.is_match(value) {
        return Err(invalid());
    }
    Decimal::from_str(value).map(Some).map_err(|_| invalid())
}

/// `MetodoPago` code. 3.2 spells the method out in `formaDePago`; the two
/// known wordings map to PUE and PPD, anything else is dropped.
fn payment_method(root: &Element) -> Option<String> {
    if let Some(code) = coded(root, &["MetodoPago"]) {
        return Some(code);
    }
    let legacy = root.attr_any(&["formaDePago"])?.to_uppercase();
    if legacy.contains("PARCIALIDAD") {
        Some("PPD".to_string())
    } else if legacy.contains("UNA SOLA EXHIBICI") {
        Some("PUE".to_string())
    } else {
        None
    }
}

/// Accepts `YYYY-MM-DDTHH:MM:SS[.fff]`, the same with an offset (kept as
/// local wall-clock time) and a bare `YYYY-MM-DD`.
fn date_time(attribute: &str, value: &str) -> Result<NaiveDateTime, DocumentError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .ok_or_else(|| DocumentError::InvalidDate {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
}
