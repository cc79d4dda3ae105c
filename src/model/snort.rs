//! Snort-style IDS alert log model.

use serde_json::json;

use super::template::{FieldSpec, LogTemplate, TemplateModel};
use super::{Model, ModelCtor};
use crate::error::Result;
use crate::extension::{Descriptor, ExtensionArgs};

fn templates() -> Vec<LogTemplate> {
    vec![
        LogTemplate::new(
            10,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("snort"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("low"))),
                ("ident", FieldSpec::Value(json!("1:2000545:12"))),
                ("clstext", FieldSpec::Value(json!("attempted-recon"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Seeded(|_, seed| json!(seed.dstport))),
                ("proto", FieldSpec::Value(json!("TCP"))),
                (
                    "msg",
                    FieldSpec::Text(
                        "[1:2000545:12] ET SCAN NMAP -sS window 1024 \
                         {srcip}:{srcport} -> {dstip}:{dstport}",
                    ),
                ),
            ],
        ),
        LogTemplate::new(
            6,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("snort"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("low"))),
                ("ident", FieldSpec::Value(json!("1:2001219:20"))),
                ("clstext", FieldSpec::Value(json!("policy-violation"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Value(json!(22))),
                ("proto", FieldSpec::Value(json!("TCP"))),
                (
                    "msg",
                    FieldSpec::Text(
                        "[1:2001219:20] ET POLICY SSH session in progress on unusual port \
                         {srcip}:{srcport} -> {dstip}:22",
                    ),
                ),
            ],
        ),
        LogTemplate::new(
            3,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("snort"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("high"))),
                ("ident", FieldSpec::Value(json!("1:2019401:3"))),
                ("clstext", FieldSpec::Value(json!("attempted-admin"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Value(json!(445))),
                ("proto", FieldSpec::Value(json!("TCP"))),
                (
                    "msg",
                    FieldSpec::Text(
                        "[1:2019401:3] ET EXPLOIT SMB remote code execution attempt \
                         {srcip}:{srcport} -> {dstip}:445",
                    ),
                ),
            ],
        ),
        LogTemplate::new(
            1,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("snort"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("critical"))),
                ("ident", FieldSpec::Value(json!("1:2027758:4"))),
                ("clstext", FieldSpec::Value(json!("trojan-activity"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Seeded(|_, seed| json!(seed.dstport))),
                ("proto", FieldSpec::Value(json!("UDP"))),
                (
                    "msg",
                    FieldSpec::Text(
                        "[1:2027758:4] ET MALWARE DNS query for known C2 domain \
                         {srcip}:{srcport} -> {dstip}:{dstport}",
                    ),
                ),
            ],
        ),
    ]
}

fn construct(_args: &ExtensionArgs) -> Result<Box<dyn Model>> {
    Ok(Box::new(TemplateModel::new("snort", templates())))
}

/// Descriptor for the built-in `snort` model.
pub fn descriptor() -> Descriptor<ModelCtor> {
    Descriptor::new("snort", construct as ModelCtor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionArgs;

    #[test]
    fn test_snort_record_shape() {
        let mut model = construct(&ExtensionArgs::new()).unwrap();
        let record = model.next().unwrap();
        assert_eq!(record.get("aname").unwrap(), "snort");
        assert!(record.contains_key("msg"));
        assert!(record.contains_key("srcip"));
        assert!(record.contains_key("clstext"));
    }

    #[test]
    fn test_msg_is_rendered() {
        let mut model = construct(&ExtensionArgs::new()).unwrap();
        for _ in 0..8 {
            let record = model.next().unwrap();
            let msg = record.get("msg").unwrap().as_str().unwrap();
            assert!(!msg.contains("{srcip}"), "unrendered msg: {msg}");
        }
    }
}
