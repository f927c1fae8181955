//! Submitted form fields and the defaults applied to them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::Rng;
use serde_derive::Deserialize;

/// Length of a generated barcode text, in hex characters.
pub const BARCODE_LEN: usize = 12;

/// Raw form submission. Missing and blank fields are treated alike.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentForm {
    pub credor: Option<String>,
    pub cpf_cnpj: Option<String>,
    pub advogado: Option<String>,
    pub agencia: Option<String>,
    pub conta: Option<String>,
    pub processo: Option<String>,
    pub contra: Option<String>,
    pub assunto: Option<String>,
    pub situacao: Option<String>,
    pub valor: Option<String>,
    pub data_emissao: Option<String>,
    pub observacoes: Option<String>,
    pub barcode_text: Option<String>,

    /// Company identifier to look up; fills `credor` when found.
    pub cnpj: Option<String>,
}

/// Form fields with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentData {
    pub credor: String,
    pub cpf_cnpj: String,
    pub advogado: String,
    pub agencia: String,
    pub conta: String,
    pub processo: String,
    pub contra: String,
    pub assunto: String,
    pub situacao: String,
    pub valor: String,
    pub data_emissao: String,
    pub observacoes: String,
    pub barcode_text: String,
    pub cnpj: Option<String>,
}

fn or_default(value: Option<String>, default: &str) -> String {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

impl DocumentForm {
    pub fn resolve(self, today: NaiveDate) -> DocumentData {
        DocumentData {
            credor: or_default(self.credor, "Fulano"),
            cpf_cnpj: or_default(self.cpf_cnpj, "000.000.000-00"),
            advogado: or_default(self.advogado, "Advogado"),
            agencia: or_default(self.agencia, "0000"),
            conta: or_default(self.conta, "000000"),
            processo: or_default(self.processo, "0000000-00.0000.0.00.0000"),
            contra: or_default(self.contra, "Réu"),
            assunto: or_default(self.assunto, "Assunto"),
            situacao: or_default(self.situacao, "AUTORIZADO"),
            valor: or_default(self.valor, "R$ 0,00"),
            data_emissao: or_default(self.data_emissao, &today.format("%d/%m/%Y").to_string()),
            observacoes: self.observacoes.unwrap_or_default(),
            barcode_text: barcode_text(self.barcode_text.as_deref()),
            cnpj: self.cnpj.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        }
    }
}

impl DocumentData {
    /// Template variables, keyed by the form's field names.
    pub fn vars(&self) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        vars.insert("credor", self.credor.clone());
        vars.insert("cpfCnpj", self.cpf_cnpj.clone());
        vars.insert("advogado", self.advogado.clone());
        vars.insert("agencia", self.agencia.clone());
        vars.insert("conta", self.conta.clone());
        vars.insert("processo", self.processo.clone());
        vars.insert("contra", self.contra.clone());
        vars.insert("assunto", self.assunto.clone());
        vars.insert("situacao", self.situacao.clone());
        vars.insert("valor", self.valor.clone());
        vars.insert("dataEmissao", self.data_emissao.clone());
        vars.insert("observacoes", self.observacoes.clone());
        vars.insert("barcodeText", self.barcode_text.clone());
        vars
    }
}

/// Trimmed user text, or a random uppercase hex string when none was given.
pub fn barcode_text(input: Option<&str>) -> String {
    match input.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            let mut rng = rand::thread_rng();
            (0..BARCODE_LEN / 2)
                .map(|_| format!("{:02X}", rng.gen::<u8>()))
                .collect()
        }
    }
}
