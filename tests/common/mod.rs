//! Shared CFDI fixture builders for integration tests.

use std::path::{Path, PathBuf};

/// RFC used as the profile owner across the test batches.
pub const PROFILE_RFC: &str = "BBB010101BBB";

/// A well-formed CFDI 4.0 income voucher addressed to `receiver_rfc`.
pub fn cfdi_v40_income(uuid: &str, receiver_rfc: &str, subtotal: &str, total: &str, vat: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante Version="4.0" Fecha="2023-01-31T12:00:00" Serie="A" Folio="1"
 TipoDeComprobante="I" SubTotal="{subtotal}" Total="{total}" Moneda="MXN"
 MetodoPago="PUE" LugarExpedicion="06600"
 xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
 xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Proveedora de Servicios SA" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="{receiver_rfc}" Nombre="Receptor SA" UsoCFDI="G03"
   DomicilioFiscalReceptor="06600" RegimenFiscalReceptor="601"/>
  <cfdi:Conceptos>
    <cfdi:Concepto Cantidad="1" Descripcion="Servicio profesional"
     ValorUnitario="{subtotal}" Importe="{subtotal}">
      <cfdi:Impuestos>
        <cfdi:Traslados>
          <cfdi:Traslado Base="{subtotal}" Impuesto="002" TipoFactor="Tasa"
           TasaOCuota="0.160000" Importe="{vat}"/>
        </cfdi:Traslados>
      </cfdi:Impuestos>
    </cfdi:Concepto>
  </cfdi:Conceptos>
  <cfdi:Impuestos TotalImpuestosTrasladados="{vat}">
    <cfdi:Traslados>
      <cfdi:Traslado Base="{subtotal}" Impuesto="002" TipoFactor="Tasa"
       TasaOCuota="0.160000" Importe="{vat}"/>
    </cfdi:Traslados>
  </cfdi:Impuestos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="{uuid}"
     FechaTimbrado="2023-01-31T12:00:30" RfcProvCertif="SAT970701NN3"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#
    )
}

/// A legacy CFDI 3.3 expense voucher (credit note) addressed to `receiver_rfc`.
pub fn cfdi_v33_expense(uuid: &str, receiver_rfc: &str, subtotal: &str, total: &str, vat: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante Version="3.3" Fecha="2022-11-05T09:15:00" TipoDeComprobante="E"
 SubTotal="{subtotal}" Total="{total}" Moneda="MXN" LugarExpedicion="44100"
 xmlns:cfdi="http://www.sat.gob.mx/cfd/3"
 xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital">
  <cfdi:Emisor Rfc="CCC010101CCC" Nombre="Distribuidora del Bajio"/>
  <cfdi:Receptor Rfc="{receiver_rfc}" UsoCFDI="G02"/>
  <cfdi:Conceptos>
    <cfdi:Concepto ClaveProdServ="80141600" Cantidad="1" Descripcion="Devolucion"
     ValorUnitario="{subtotal}" Importe="{subtotal}">
      <cfdi:Impuestos>
        <cfdi:Traslados>
          <cfdi:Traslado Base="{subtotal}" Impuesto="002" TipoFactor="Tasa"
           TasaOCuota="0.160000" Importe="{vat}"/>
        </cfdi:Traslados>
      </cfdi:Impuestos>
    </cfdi:Concepto>
  </cfdi:Conceptos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="{uuid}"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#
    )
}

/// A CFDI 4.0 payment complement; always classified aside, never counted.
pub fn cfdi_v40_payment(uuid: &str, receiver_rfc: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante Version="4.0" Fecha="2023-02-10T10:00:00" TipoDeComprobante="P"
 SubTotal="0" Total="0" Moneda="XXX" LugarExpedicion="06600"
 xmlns:cfdi="http://www.sat.gob.mx/cfd/4"
 xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Proveedora de Servicios SA"/>
  <cfdi:Receptor Rfc="{receiver_rfc}" Nombre="Receptor SA" UsoCFDI="CP01"
   DomicilioFiscalReceptor="06600"/>
  <cfdi:Conceptos>
    <cfdi:Concepto Cantidad="1" Descripcion="Pago" ValorUnitario="0" Importe="0"/>
  </cfdi:Conceptos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="{uuid}"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#
    )
}

pub async fn write_voucher(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path
}
