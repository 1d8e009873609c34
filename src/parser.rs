//! CFDI XML parser.
//!
//! Pure function of input bytes: no I/O, no shared state. The schema dialect
//! (3.3 vs 4.0) is detected from the root namespace before any field is
//! extracted, and each dialect contributes a capability set describing which
//! fields it requires or carries. Amounts parse as exact decimals only.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use rust_decimal::Decimal;

use crate::error::{ParseError, ParseResult};
use crate::model::{Concept, Party, SchemaVersion, TaxKind, TaxTotals, Voucher, VoucherType};

const CFDI_NS_V33: &[u8] = b"http://www.sat.gob.mx/cfd/3";
const CFDI_NS_V40: &[u8] = b"http://www.sat.gob.mx/cfd/4";
const TFD_NS: &[u8] = b"http://www.sat.gob.mx/TimbreFiscalDigital";

/// Capability set for one schema dialect. The post-parse [`Voucher`] shape is
/// shared, so everything downstream stays version-agnostic.
#[derive(Debug, Clone, Copy)]
struct Dialect {
    version: SchemaVersion,
    /// 4.0 requires issuer and receiver legal names
    requires_party_names: bool,
    /// 4.0 requires the receiver fiscal address (`DomicilioFiscalReceptor`)
    requires_receiver_address: bool,
    /// Only 3.3 carries the catch-all `ClaveProdServ` concept key forward
    reads_prod_serv_key: bool,
}

impl Dialect {
    fn for_version(version: SchemaVersion) -> Self {
        match version {
            SchemaVersion::V33 => Self {
                version,
                requires_party_names: false,
                requires_receiver_address: false,
                reads_prod_serv_key: true,
            },
            SchemaVersion::V40 => Self {
                version,
                requires_party_names: true,
                requires_receiver_address: true,
                reads_prod_serv_key: false,
            },
        }
    }
}

/// Attribute bag for one element, keyed by local attribute name.
type Attrs = HashMap<String, String>;

fn read_attrs(element: &BytesStart<'_>) -> ParseResult<Attrs> {
    let mut attrs = Attrs::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::MalformedXml {
            details: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::MalformedXml {
                details: e.to_string(),
            })?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn required<'a>(attrs: &'a Attrs, element: &str, attribute: &str) -> ParseResult<&'a str> {
    attrs
        .get(attribute)
        .map(String::as_str)
        .ok_or_else(|| ParseError::missing_field(element, attribute))
}

fn optional(attrs: &Attrs, attribute: &str) -> Option<String> {
    attrs
        .get(attribute)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_amount(value: &str, attribute: &str) -> ParseResult<Decimal> {
    Decimal::from_str_exact(value.trim()).map_err(|_| ParseError::InvalidAmount {
        attribute: attribute.to_string(),
        value: value.to_string(),
    })
}

fn optional_amount(attrs: &Attrs, attribute: &str) -> ParseResult<Decimal> {
    match attrs.get(attribute) {
        Some(value) => parse_amount(value, attribute),
        None => Ok(Decimal::ZERO),
    }
}

/// CFDI dates look like `2023-01-31T12:00:00`, sometimes with a trailing
/// fraction or `Z`; the zone is ignored like upstream tooling does.
fn parse_issue_date(raw: &str) -> ParseResult<NaiveDateTime> {
    let trimmed = raw.trim();
    let no_zone = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    let no_fraction = no_zone.split('.').next().unwrap_or(no_zone);
    NaiveDateTime::parse_from_str(no_fraction, "%Y-%m-%dT%H:%M:%S").map_err(|_| {
        ParseError::InvalidDate {
            value: raw.to_string(),
        }
    })
}

fn detect_dialect(resolution: &ResolveResult<'_>, attrs: &Attrs) -> ParseResult<Dialect> {
    let version = match resolution {
        ResolveResult::Bound(Namespace(ns)) if *ns == CFDI_NS_V33 => SchemaVersion::V33,
        ResolveResult::Bound(Namespace(ns)) if *ns == CFDI_NS_V40 => SchemaVersion::V40,
        ResolveResult::Bound(Namespace(ns)) => {
            return Err(ParseError::UnsupportedRoot {
                found: String::from_utf8_lossy(ns).into_owned(),
            });
        }
        // No namespace: fall back to the Version attribute
        _ => match required(attrs, "Comprobante", "Version")?.trim() {
            v if v.starts_with("3.3") => SchemaVersion::V33,
            v if v.starts_with("4.0") => SchemaVersion::V40,
            v => {
                return Err(ParseError::UnsupportedVersion {
                    version: v.to_string(),
                });
            }
        },
    };
    Ok(Dialect::for_version(version))
}

/// Where a `Traslado`/`Retencion` row lands: the document-level totals block
/// or the current concept's breakdown.
enum TaxContext {
    Document,
    Concept,
}

/// Mutable parse state threaded through the event loop.
#[derive(Default)]
struct ParseState {
    dialect: Option<Dialect>,
    root_attrs: Option<Attrs>,
    issuer: Option<Party>,
    receiver: Option<Party>,
    uuid: Option<String>,
    concepts: Vec<Concept>,
    current_concept: Option<Concept>,
    /// `Some` once a document-level `Impuestos` block was seen, even if empty
    document_taxes: Option<TaxTotals>,
    stack: Vec<String>,
}

impl ParseState {
    fn in_concept(&self) -> bool {
        self.stack.iter().any(|name| name == "Concepto") || self.current_concept.is_some()
    }

    fn dialect(&self) -> ParseResult<Dialect> {
        self.dialect.ok_or_else(|| ParseError::MalformedXml {
            details: "element outside Comprobante root".to_string(),
        })
    }
}

/// Parse raw XML bytes into a [`Voucher`] or a structured [`ParseError`].
///
/// Tolerates a missing taxes block (zero totals) and unknown SAT tax codes
/// (skipped), but rejects structural violations: missing required fields for
/// the detected dialect, unparsable dates or amounts, no fiscal UUID, empty
/// concepts, negative total.
pub fn parse_voucher(bytes: &[u8]) -> ParseResult<Voucher> {
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    let mut buf = Vec::new();

    loop {
        let (resolution, event) =
            reader
                .read_resolved_event_into(&mut buf)
                .map_err(|e| ParseError::MalformedXml {
                    details: e.to_string(),
                })?;
        match event {
            Event::Start(element) => {
                handle_element(&mut state, &resolution, &element)?;
                let local = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                state.stack.push(local);
            }
            Event::Empty(element) => {
                handle_element(&mut state, &resolution, &element)?;
                // Self-closing concepts get no End event
                if element.local_name().as_ref() == b"Concepto"
                    && let Some(concept) = state.current_concept.take()
                {
                    state.concepts.push(concept);
                }
            }
            Event::End(element) => {
                let local = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                state.stack.pop();
                if local == "Concepto"
                    && let Some(concept) = state.current_concept.take()
                {
                    state.concepts.push(concept);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    build_voucher(state)
}

fn handle_element(
    state: &mut ParseState,
    resolution: &ResolveResult<'_>,
    element: &BytesStart<'_>,
) -> ParseResult<()> {
    let local_name = element.local_name();
    let local = local_name.as_ref();

    // First element must be the CFDI root
    if state.dialect.is_none() {
        if local != b"Comprobante" {
            return Err(ParseError::UnsupportedRoot {
                found: String::from_utf8_lossy(local).into_owned(),
            });
        }
        let attrs = read_attrs(element)?;
        state.dialect = Some(detect_dialect(resolution, &attrs)?);
        state.root_attrs = Some(attrs);
        return Ok(());
    }

    match local {
        b"Emisor" if !state.in_concept() => {
            let dialect = state.dialect()?;
            let attrs = read_attrs(element)?;
            let name = optional(&attrs, "Nombre");
            if dialect.requires_party_names && name.is_none() {
                return Err(ParseError::missing_field("Emisor", "Nombre"));
            }
            state.issuer = Some(Party {
                tax_id: required(&attrs, "Emisor", "Rfc")?.trim().to_uppercase(),
                name,
                // LugarExpedicion lives on the root; filled in at build time
                postal_code: None,
            });
        }
        b"Receptor" if !state.in_concept() => {
            let dialect = state.dialect()?;
            let attrs = read_attrs(element)?;
            let name = optional(&attrs, "Nombre");
            if dialect.requires_party_names && name.is_none() {
                return Err(ParseError::missing_field("Receptor", "Nombre"));
            }
            let postal_code = optional(&attrs, "DomicilioFiscalReceptor");
            if dialect.requires_receiver_address && postal_code.is_none() {
                return Err(ParseError::missing_field(
                    "Receptor",
                    "DomicilioFiscalReceptor",
                ));
            }
            state.receiver = Some(Party {
                tax_id: required(&attrs, "Receptor", "Rfc")?.trim().to_uppercase(),
                name,
                postal_code,
            });
        }
        b"Concepto" => {
            let dialect = state.dialect()?;
            let attrs = read_attrs(element)?;
            state.current_concept = Some(Concept {
                description: required(&attrs, "Concepto", "Descripcion")?.to_string(),
                quantity: parse_amount(required(&attrs, "Concepto", "Cantidad")?, "Cantidad")?,
                unit_value: parse_amount(
                    required(&attrs, "Concepto", "ValorUnitario")?,
                    "ValorUnitario",
                )?,
                amount: parse_amount(required(&attrs, "Concepto", "Importe")?, "Importe")?,
                discount: optional_amount(&attrs, "Descuento")?,
                prod_serv_key: if dialect.reads_prod_serv_key {
                    optional(&attrs, "ClaveProdServ")
                } else {
                    None
                },
                taxes: BTreeMap::new(),
            });
        }
        b"Impuestos" if !state.in_concept() => {
            // Document-level totals block; its presence wins over per-concept
            // breakdowns even when it carries no rows
            state.document_taxes.get_or_insert_with(TaxTotals::default);
        }
        b"Traslado" => {
            let attrs = read_attrs(element)?;
            record_tax_row(state, &attrs, TaxRow::Transfer)?;
        }
        b"Retencion" => {
            let attrs = read_attrs(element)?;
            record_tax_row(state, &attrs, TaxRow::Withholding)?;
        }
        b"TimbreFiscalDigital" => {
            if let ResolveResult::Bound(Namespace(ns)) = resolution
                && *ns == TFD_NS
            {
                let attrs = read_attrs(element)?;
                if let Some(uuid) = optional(&attrs, "UUID") {
                    state.uuid = Some(uuid.to_uppercase());
                }
            }
        }
        _ => {}
    }
    Ok(())
}

enum TaxRow {
    Transfer,
    Withholding,
}

fn record_tax_row(state: &mut ParseState, attrs: &Attrs, row: TaxRow) -> ParseResult<()> {
    let Some(code) = attrs.get("Impuesto") else {
        // Tax rows without a code are skipped rather than failing the document
        return Ok(());
    };
    let amount = optional_amount(attrs, "Importe")?;
    let kind = match row {
        TaxRow::Transfer => TaxKind::from_transfer_code(code),
        TaxRow::Withholding => TaxKind::from_withholding_code(code),
    };
    let Some(kind) = kind else {
        return Ok(());
    };

    let context = if state.in_concept() {
        TaxContext::Concept
    } else {
        TaxContext::Document
    };
    match context {
        TaxContext::Concept => {
            if let Some(concept) = state.current_concept.as_mut() {
                *concept.taxes.entry(kind).or_insert(Decimal::ZERO) += amount;
            }
        }
        TaxContext::Document => {
            let totals = state.document_taxes.get_or_insert_with(TaxTotals::default);
            apply_tax(totals, kind, amount);
        }
    }
    Ok(())
}

fn apply_tax(totals: &mut TaxTotals, kind: TaxKind, amount: Decimal) {
    match kind {
        TaxKind::VatTransferred => totals.vat_transferred += amount,
        TaxKind::IsrWithheld => totals.isr_withheld += amount,
        TaxKind::VatWithheld => totals.vat_withheld += amount,
        TaxKind::IepsTransferred | TaxKind::IepsWithheld => totals.ieps += amount,
    }
}

/// Fold per-concept breakdowns into voucher totals; used only when the
/// document carries no `Impuestos` block of its own.
fn taxes_from_concepts(concepts: &[Concept]) -> TaxTotals {
    let mut totals = TaxTotals::default();
    for concept in concepts {
        for (kind, amount) in &concept.taxes {
            apply_tax(&mut totals, *kind, *amount);
        }
    }
    totals
}

fn build_voucher(state: ParseState) -> ParseResult<Voucher> {
    let Some(dialect) = state.dialect else {
        return Err(ParseError::MalformedXml {
            details: "no root element".to_string(),
        });
    };
    let root = state.root_attrs.unwrap_or_default();

    let uuid = state.uuid.filter(|u| !u.is_empty()).ok_or(ParseError::MissingUuid)?;
    let issuer = {
        let mut issuer = state
            .issuer
            .ok_or_else(|| ParseError::missing_field("Comprobante", "Emisor"))?;
        issuer.postal_code = optional(&root, "LugarExpedicion");
        issuer
    };
    let receiver = state
        .receiver
        .ok_or_else(|| ParseError::missing_field("Comprobante", "Receptor"))?;

    if state.concepts.is_empty() {
        return Err(ParseError::EmptyConcepts);
    }

    let issue_date = parse_issue_date(required(&root, "Comprobante", "Fecha")?)?;
    let subtotal = parse_amount(required(&root, "Comprobante", "SubTotal")?, "SubTotal")?;
    let total = parse_amount(required(&root, "Comprobante", "Total")?, "Total")?;
    if total < Decimal::ZERO {
        return Err(ParseError::NegativeTotal {
            total: total.to_string(),
        });
    }

    let taxes = match state.document_taxes {
        Some(totals) => totals,
        None => taxes_from_concepts(&state.concepts),
    };

    Ok(Voucher {
        uuid,
        schema_version: dialect.version,
        voucher_type: VoucherType::from_code(required(
            &root,
            "Comprobante",
            "TipoDeComprobante",
        )?),
        series: optional(&root, "Serie"),
        folio: optional(&root, "Folio"),
        issue_date,
        issuer,
        receiver,
        currency: optional(&root, "Moneda").unwrap_or_else(|| "MXN".to_string()),
        subtotal,
        discount: optional_amount(&root, "Descuento")?,
        total,
        payment_method: optional(&root, "MetodoPago"),
        taxes,
        concepts: state.concepts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_V40: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante Version="4.0" Fecha="2023-01-31T12:00:00" Serie="A" Folio="1"
 TipoDeComprobante="I" SubTotal="1000.00" Total="1160.00" Moneda="MXN"
 MetodoPago="PUE" LugarExpedicion="06600"
 xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
 xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Emisor SA de CV" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="BBB010101BBB" Nombre="Receptor SA de CV" UsoCFDI="G03"
   DomicilioFiscalReceptor="06600" RegimenFiscalReceptor="601"/>
  <cfdi:Conceptos>
    <cfdi:Concepto ClaveProdServ="01010101" Cantidad="1" Descripcion="Servicio de prueba"
     ValorUnitario="1000.00" Importe="1000.00">
      <cfdi:Impuestos>
        <cfdi:Traslados>
          <cfdi:Traslado Base="1000.00" Impuesto="002" TipoFactor="Tasa"
           TasaOCuota="0.160000" Importe="160.00"/>
        </cfdi:Traslados>
      </cfdi:Impuestos>
    </cfdi:Concepto>
  </cfdi:Conceptos>
  <cfdi:Impuestos TotalImpuestosTrasladados="160.00">
    <cfdi:Traslados>
      <cfdi:Traslado Base="1000.00" Impuesto="002" TipoFactor="Tasa"
       TasaOCuota="0.160000" Importe="160.00"/>
    </cfdi:Traslados>
  </cfdi:Impuestos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="12345678-1234-1234-1234-123456789012"
     FechaTimbrado="2023-01-31T12:00:00" RfcProvCertif="SAT970701NN3"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#;

    const SAMPLE_V33: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante Version="3.3" Fecha="2022-11-05T09:15:00" TipoDeComprobante="I"
 SubTotal="500.00" Total="580.00" LugarExpedicion="44100"
 xmlns:cfdi="http://www.sat.gob.mx/cfd/3"
 xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital">
  <cfdi:Emisor Rfc="CCC010101CCC"/>
  <cfdi:Receptor Rfc="BBB010101BBB" UsoCFDI="G03"/>
  <cfdi:Conceptos>
    <cfdi:Concepto ClaveProdServ="80141600" Cantidad="2" Descripcion="Producto legado"
     ValorUnitario="250.00" Importe="500.00">
      <cfdi:Impuestos>
        <cfdi:Traslados>
          <cfdi:Traslado Base="500.00" Impuesto="002" TipoFactor="Tasa"
           TasaOCuota="0.160000" Importe="80.00"/>
        </cfdi:Traslados>
      </cfdi:Impuestos>
    </cfdi:Concepto>
  </cfdi:Conceptos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="abcdefab-0000-1111-2222-333333333333"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#;

    #[test]
    fn test_parse_v40_income_voucher() {
        let voucher = parse_voucher(SAMPLE_V40.as_bytes()).unwrap();
        assert_eq!(voucher.uuid, "12345678-1234-1234-1234-123456789012");
        assert_eq!(voucher.schema_version, SchemaVersion::V40);
        assert_eq!(voucher.voucher_type, VoucherType::Income);
        assert_eq!(voucher.series.as_deref(), Some("A"));
        assert_eq!(voucher.folio.as_deref(), Some("1"));
        assert_eq!(voucher.subtotal, Decimal::new(100000, 2));
        assert_eq!(voucher.total, Decimal::new(116000, 2));
        assert_eq!(voucher.issuer.tax_id, "AAA010101AAA");
        assert_eq!(voucher.issuer.postal_code.as_deref(), Some("06600"));
        assert_eq!(voucher.receiver.tax_id, "BBB010101BBB");
        assert_eq!(voucher.receiver.postal_code.as_deref(), Some("06600"));
        assert_eq!(voucher.concepts.len(), 1);
        // 4.0 drops the catch-all product/service key
        assert!(voucher.concepts[0].prod_serv_key.is_none());
    }

    #[test]
    fn test_document_tax_block_wins_over_concept_rows() {
        // The fixture carries the 160.00 VAT both at document level and per
        // concept; only the document block may count
        let voucher = parse_voucher(SAMPLE_V40.as_bytes()).unwrap();
        assert_eq!(voucher.taxes.vat_transferred, Decimal::new(16000, 2));
        assert_eq!(
            voucher.concepts[0].taxes.get(&TaxKind::VatTransferred),
            Some(&Decimal::new(16000, 2))
        );
    }

    #[test]
    fn test_parse_v33_voucher() {
        let voucher = parse_voucher(SAMPLE_V33.as_bytes()).unwrap();
        assert_eq!(voucher.schema_version, SchemaVersion::V33);
        assert!(voucher.is_legacy());
        // 3.3 has no party names, which is fine for that dialect
        assert!(voucher.issuer.name.is_none());
        // no document-level block: totals derived from concept breakdowns
        assert_eq!(voucher.taxes.vat_transferred, Decimal::new(8000, 2));
        // 3.3 keeps the catch-all concept key
        assert_eq!(
            voucher.concepts[0].prod_serv_key.as_deref(),
            Some("80141600")
        );
        // UUID is uppercased for the dedup key
        assert_eq!(voucher.uuid, "ABCDEFAB-0000-1111-2222-333333333333");
    }

    #[test]
    fn test_malformed_xml() {
        let result = parse_voucher(b"<cfdi:Comprobante><unclosed>");
        assert!(matches!(result, Err(ParseError::MalformedXml { .. })));

        let result = parse_voucher(b"not xml at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_document() {
        let result = parse_voucher(b"");
        assert!(matches!(result, Err(ParseError::MalformedXml { .. })));
    }

    #[test]
    fn test_unsupported_root() {
        let result = parse_voucher(b"<Factura Version=\"4.0\"/>");
        assert!(matches!(
            result,
            Err(ParseError::UnsupportedRoot { found }) if found == "Factura"
        ));
    }

    #[test]
    fn test_unsupported_version_without_namespace() {
        let xml = r#"<Comprobante Version="3.2" Fecha="2020-01-01T00:00:00"
            TipoDeComprobante="I" SubTotal="1" Total="1"/>"#;
        let result = parse_voucher(xml.as_bytes());
        assert!(matches!(
            result,
            Err(ParseError::UnsupportedVersion { version }) if version == "3.2"
        ));
    }

    #[test]
    fn test_version_attribute_fallback_without_namespace() {
        let xml = r#"<Comprobante Version="4.0" Fecha="2023-01-31T12:00:00"
 TipoDeComprobante="I" SubTotal="100" Total="116" LugarExpedicion="06600">
  <Emisor Rfc="AAA010101AAA" Nombre="Emisor"/>
  <Receptor Rfc="BBB010101BBB" Nombre="Receptor" DomicilioFiscalReceptor="06600"/>
  <Conceptos>
    <Concepto Cantidad="1" Descripcion="X" ValorUnitario="100" Importe="100"/>
  </Conceptos>
  <Complemento>
    <TimbreFiscalDigital UUID="00000000-0000-0000-0000-000000000001"
     xmlns="http://www.sat.gob.mx/TimbreFiscalDigital"/>
  </Complemento>
</Comprobante>"#;
        let voucher = parse_voucher(xml.as_bytes()).unwrap();
        assert_eq!(voucher.schema_version, SchemaVersion::V40);
    }

    #[test]
    fn test_missing_uuid() {
        let xml = SAMPLE_V40.replace(
            r#"UUID="12345678-1234-1234-1234-123456789012""#,
            r#"UUID="""#,
        );
        assert_eq!(parse_voucher(xml.as_bytes()), Err(ParseError::MissingUuid));

        // No complement at all
        let start = SAMPLE_V40.find("<cfdi:Complemento>").unwrap();
        let end = SAMPLE_V40.find("</cfdi:Complemento>").unwrap() + "</cfdi:Complemento>".len();
        let without = format!("{}{}", &SAMPLE_V40[..start], &SAMPLE_V40[end..]);
        assert_eq!(
            parse_voucher(without.as_bytes()),
            Err(ParseError::MissingUuid)
        );
    }

    #[test]
    fn test_v40_requires_receiver_address() {
        let xml = SAMPLE_V40.replace(r#" DomicilioFiscalReceptor="06600""#, "");
        assert_eq!(
            parse_voucher(xml.as_bytes()),
            Err(ParseError::missing_field(
                "Receptor",
                "DomicilioFiscalReceptor"
            ))
        );
    }

    #[test]
    fn test_v40_requires_party_names() {
        let xml = SAMPLE_V40.replace(r#" Nombre="Emisor SA de CV""#, "");
        assert_eq!(
            parse_voucher(xml.as_bytes()),
            Err(ParseError::missing_field("Emisor", "Nombre"))
        );
    }

    #[test]
    fn test_invalid_amount_is_structured_failure() {
        let xml = SAMPLE_V40.replace(r#"Total="1160.00""#, r#"Total="1,160.00""#);
        assert!(matches!(
            parse_voucher(xml.as_bytes()),
            Err(ParseError::InvalidAmount { attribute, .. }) if attribute == "Total"
        ));
    }

    #[test]
    fn test_invalid_date_is_structured_failure() {
        let xml = SAMPLE_V40.replace(r#"Fecha="2023-01-31T12:00:00""#, r#"Fecha="tomorrow""#);
        assert!(matches!(
            parse_voucher(xml.as_bytes()),
            Err(ParseError::InvalidDate { value }) if value == "tomorrow"
        ));
    }

    #[test]
    fn test_date_tolerates_fraction_and_zone_suffix() {
        let xml = SAMPLE_V40.replace(
            r#"Fecha="2023-01-31T12:00:00""#,
            r#"Fecha="2023-01-31T12:00:00.123Z""#,
        );
        let voucher = parse_voucher(xml.as_bytes()).unwrap();
        assert_eq!(
            voucher.issue_date.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "2023-01-31T12:00:00"
        );
    }

    #[test]
    fn test_empty_concepts_rejected() {
        let start = SAMPLE_V40.find("<cfdi:Conceptos>").unwrap();
        let end = SAMPLE_V40.find("</cfdi:Conceptos>").unwrap() + "</cfdi:Conceptos>".len();
        let xml = format!("{}{}", &SAMPLE_V40[..start], &SAMPLE_V40[end..]);
        assert_eq!(
            parse_voucher(xml.as_bytes()),
            Err(ParseError::EmptyConcepts)
        );
    }

    #[test]
    fn test_negative_total_rejected() {
        let xml = SAMPLE_V40.replace(r#"Total="1160.00""#, r#"Total="-1.00""#);
        assert!(matches!(
            parse_voucher(xml.as_bytes()),
            Err(ParseError::NegativeTotal { .. })
        ));
    }

    #[test]
    fn test_missing_taxes_block_is_zero_not_failure() {
        let xml = r#"<cfdi:Comprobante Version="4.0" Fecha="2023-03-01T08:00:00"
 TipoDeComprobante="I" SubTotal="100.00" Total="100.00" LugarExpedicion="06600"
 xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
 xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Emisor"/>
  <cfdi:Receptor Rfc="BBB010101BBB" Nombre="Receptor" DomicilioFiscalReceptor="06600"/>
  <cfdi:Conceptos>
    <cfdi:Concepto Cantidad="1" Descripcion="Exento" ValorUnitario="100.00" Importe="100.00"/>
  </cfdi:Conceptos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital UUID="00000000-0000-0000-0000-00000000000A"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#;
        let voucher = parse_voucher(xml.as_bytes()).unwrap();
        assert_eq!(voucher.taxes, TaxTotals::default());
    }

    #[test]
    fn test_unknown_tax_codes_skipped() {
        let xml = SAMPLE_V40.replace(r#"Impuesto="002""#, r#"Impuesto="777""#);
        let voucher = parse_voucher(xml.as_bytes()).unwrap();
        assert_eq!(voucher.taxes.vat_transferred, Decimal::ZERO);
        assert!(voucher.concepts[0].taxes.is_empty());
    }

    #[test]
    fn test_withholdings_parsed() {
        let xml = SAMPLE_V40.replace(
            "<cfdi:Impuestos TotalImpuestosTrasladados=\"160.00\">\n    <cfdi:Traslados>\n      <cfdi:Traslado Base=\"1000.00\" Impuesto=\"002\" TipoFactor=\"Tasa\"\n       TasaOCuota=\"0.160000\" Importe=\"160.00\"/>\n    </cfdi:Traslados>\n  </cfdi:Impuestos>",
            "<cfdi:Impuestos>\n    <cfdi:Retenciones>\n      <cfdi:Retencion Impuesto=\"001\" Importe=\"100.00\"/>\n      <cfdi:Retencion Impuesto=\"002\" Importe=\"106.67\"/>\n      <cfdi:Retencion Impuesto=\"003\" Importe=\"5.00\"/>\n    </cfdi:Retenciones>\n  </cfdi:Impuestos>",
        );
        let voucher = parse_voucher(xml.as_bytes()).unwrap();
        assert_eq!(voucher.taxes.isr_withheld, Decimal::new(10000, 2));
        assert_eq!(voucher.taxes.vat_withheld, Decimal::new(10667, 2));
        assert_eq!(voucher.taxes.ieps, Decimal::new(500, 2));
        // the transfer rows are gone from the document block
        assert_eq!(voucher.taxes.vat_transferred, Decimal::ZERO);
    }

    #[test]
    fn test_payment_voucher_parses() {
        // Payments are not a parse failure; classification routes them aside
        let xml = SAMPLE_V40.replace(
            r#"TipoDeComprobante="I""#,
            r#"TipoDeComprobante="P""#,
        );
        let voucher = parse_voucher(xml.as_bytes()).unwrap();
        assert_eq!(voucher.voucher_type, VoucherType::Payment);
    }

    #[test]
    fn test_amounts_are_exact_decimals() {
        let voucher = parse_voucher(SAMPLE_V40.as_bytes()).unwrap();
        // 1160.00 must round-trip to exactly two decimal places
        assert_eq!(voucher.total.to_string(), "1160.00");
        assert_eq!(voucher.total.scale(), 2);
    }
}
