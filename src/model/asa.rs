//! Cisco-ASA-style firewall log model.

use serde_json::json;

use super::template::{FieldSpec, LogTemplate, TemplateModel};
use super::{Model, ModelCtor};
use crate::error::Result;
use crate::extension::{Descriptor, ExtensionArgs};

fn templates() -> Vec<LogTemplate> {
    vec![
        LogTemplate::new(
            8,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("asa"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("low"))),
                ("ident", FieldSpec::Value(json!("ASA-6-302013"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Seeded(|_, seed| json!(seed.dstport))),
                (
                    "msg",
                    FieldSpec::Text(
                        "%ASA-6-302013: Built outbound TCP connection for outside:\
                         {dstip}/{dstport} to inside:{srcip}/{srcport}",
                    ),
                ),
            ],
        ),
        LogTemplate::new(
            8,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("asa"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("low"))),
                ("ident", FieldSpec::Value(json!("ASA-6-302014"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Seeded(|_, seed| json!(seed.dstport))),
                (
                    "msg",
                    FieldSpec::Text(
                        "%ASA-6-302014: Teardown TCP connection for outside:\
                         {dstip}/{dstport} to inside:{srcip}/{srcport} duration 0:02:01",
                    ),
                ),
            ],
        ),
        LogTemplate::new(
            3,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("asa"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("medium"))),
                ("ident", FieldSpec::Value(json!("ASA-4-106023"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("srcport", FieldSpec::Seeded(|_, seed| json!(seed.srcport))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                ("dstport", FieldSpec::Seeded(|_, seed| json!(seed.dstport))),
                (
                    "msg",
                    FieldSpec::Text(
                        "%ASA-4-106023: Deny tcp src outside:{srcip}/{srcport} dst \
                         inside:{dstip}/{dstport} by access-group \"OUTSIDE_IN\"",
                    ),
                ),
            ],
        ),
        LogTemplate::new(
            1,
            vec![
                ("ctime", FieldSpec::Seeded(|_, seed| json!(seed.ctime))),
                ("aname", FieldSpec::Value(json!("asa"))),
                ("aid", FieldSpec::Seeded(|_, seed| json!(seed.aid))),
                ("severity", FieldSpec::Value(json!("high"))),
                ("ident", FieldSpec::Value(json!("ASA-2-106017"))),
                ("srcip", FieldSpec::Seeded(|_, seed| json!(seed.srcip))),
                ("dstip", FieldSpec::Seeded(|_, seed| json!(seed.dstip))),
                (
                    "msg",
                    FieldSpec::Text(
                        "%ASA-2-106017: Deny IP due to Land Attack from {srcip} to {dstip}",
                    ),
                ),
            ],
        ),
    ]
}

fn construct(_args: &ExtensionArgs) -> Result<Box<dyn Model>> {
    Ok(Box::new(TemplateModel::new("asa", templates())))
}

/// Descriptor for the built-in `asa` model.
pub fn descriptor() -> Descriptor<ModelCtor> {
    Descriptor::new("asa", construct as ModelCtor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionArgs;

    #[test]
    fn test_asa_record_shape() {
        let mut model = construct(&ExtensionArgs::new()).unwrap();
        let record = model.next().unwrap();
        assert_eq!(record.get("aname").unwrap(), "asa");
        let ident = record.get("ident").unwrap().as_str().unwrap();
        assert!(ident.starts_with("ASA-"));
        let msg = record.get("msg").unwrap().as_str().unwrap();
        assert!(msg.starts_with("%ASA-"));
        assert!(!msg.contains('{'));
    }
}
