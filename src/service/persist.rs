//! Persisted service records.
//!
//! Services exchange opaque key/value records with the configuration
//! layer, encoded as JSON maps. The loader is forgiving: malformed stream
//! entries are skipped and loading continues. Components are loaded in
//! declared order and then sorted ascending by their `position` key.
//!
//! The `ancillartyid` key keeps its historical misspelling; records
//! written by older versions must keep loading.

use serde_json::{json, Map, Value};

use super::stream::{Caid, StreamType};
use super::Service;

/// Serializes the service into its persisted record.
pub fn save(svc: &Service) -> Value {
    let st = svc.state();

    let mut m = Map::new();
    m.insert("pcr".into(), json!(st.pcr_pid));
    m.insert("pmt".into(), json!(st.pmt_pid));

    let mut list = Vec::new();
    for es in &st.components {
        let mut sub = Map::new();
        sub.insert("pid".into(), json!(es.pid));
        sub.insert("type".into(), json!(es.stream_type.as_str()));
        sub.insert("position".into(), json!(es.position));

        if !es.lang.is_empty() {
            sub.insert("language".into(), json!(es.lang));
        }

        if es.stream_type.is_audio() {
            sub.insert("audio_type".into(), json!(es.audio_type));
        }

        if es.stream_type == StreamType::Ca {
            let caids: Vec<Value> = es
                .caids
                .iter()
                .map(|c| {
                    let mut caid = Map::new();
                    caid.insert("caid".into(), json!(c.caid));
                    if c.providerid != 0 {
                        caid.insert("providerid".into(), json!(c.providerid));
                    }
                    Value::Object(caid)
                })
                .collect();
            sub.insert("caidlist".into(), Value::Array(caids));
        }

        if es.stream_type == StreamType::DvbSub {
            sub.insert("compositionid".into(), json!(es.composition_id));
            sub.insert("ancillartyid".into(), json!(es.ancillary_id));
        }

        if es.stream_type == StreamType::TextSub {
            sub.insert("parentpid".into(), json!(es.parent_pid));
        }

        if es.stream_type.is_video() {
            if es.width != 0 {
                sub.insert("width".into(), json!(es.width));
            }
            if es.height != 0 {
                sub.insert("height".into(), json!(es.height));
            }
            if es.frame_duration != 0 {
                sub.insert("duration".into(), json!(es.frame_duration));
            }
        }

        list.push(Value::Object(sub));
    }
    m.insert("stream".into(), Value::Array(list));
    Value::Object(m)
}

fn get_u32(m: &Value, key: &str) -> Option<u32> {
    m.get(key)?.as_u64().and_then(|v| u32::try_from(v).ok())
}

fn load_legacy_caid(m: &Value, caids: &mut Vec<Caid>) {
    let provider = get_u32(m, "caproviderid").unwrap_or(0);
    let caid = match get_u32(m, "caidnum") {
        Some(v) => v as u16,
        None => match m.get("caid").and_then(Value::as_str) {
            Some(name) => match u16::from_str_radix(name, 16) {
                Ok(v) => v,
                Err(_) => return,
            },
            None => return,
        },
    };
    caids.push(Caid::new(caid, provider));
}

fn load_caidlist(m: &Value, caids: &mut Vec<Caid>) {
    let Some(list) = m.get("caidlist").and_then(Value::as_array) else {
        return;
    };
    for c in list {
        let Some(caid) = get_u32(c, "caid") else {
            continue;
        };
        let provider = get_u32(c, "providerid").unwrap_or(0);
        caids.push(Caid::new(caid as u16, provider));
    }
}

/// Populates the service from a persisted record.
///
/// Malformed stream entries are skipped; everything that parses is kept.
pub fn load(svc: &Service, conf: &Value) {
    let mut st = svc.state();

    if let Some(v) = get_u32(conf, "pcr") {
        st.pcr_pid = v as u16;
    }
    if let Some(v) = get_u32(conf, "pmt") {
        st.pmt_pid = v as u16;
    }

    if let Some(list) = conf.get("stream").and_then(Value::as_array) {
        for c in list {
            let Some(tag) = c.get("type").and_then(Value::as_str) else {
                continue;
            };
            let Some(stream_type) = StreamType::from_str_tag(tag) else {
                continue;
            };
            let Some(pid) = c.get("pid").and_then(Value::as_i64) else {
                continue;
            };

            let pos = st.stream_create(pid as i32, stream_type);
            let es = &mut st.components[pos];

            if let Some(lang) = c.get("language").and_then(Value::as_str) {
                es.lang = lang.chars().take(3).collect();
            }

            if stream_type.is_audio() {
                if let Some(v) = get_u32(c, "audio_type") {
                    es.audio_type = v as u8;
                }
            }

            if let Some(v) = get_u32(c, "position") {
                es.position = v;
            }

            load_legacy_caid(c, &mut es.caids);
            load_caidlist(c, &mut es.caids);

            if stream_type == StreamType::DvbSub {
                if let Some(v) = get_u32(c, "compositionid") {
                    es.composition_id = v as u16;
                }
                if let Some(v) = get_u32(c, "ancillartyid") {
                    es.ancillary_id = v as u16;
                }
            }

            if stream_type == StreamType::TextSub {
                if let Some(v) = get_u32(c, "parentpid") {
                    es.parent_pid = v as u16;
                }
            }

            if stream_type.is_video() {
                if let Some(v) = get_u32(c, "width") {
                    es.width = v;
                }
                if let Some(v) = get_u32(c, "height") {
                    es.height = v;
                }
                if let Some(v) = get_u32(c, "duration") {
                    es.frame_duration = v;
                }
            }
        }
    }

    st.components.sort_by_key(|es| es.position);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::context::PvrContext;
    use crate::service::instance::ServiceInstanceList;
    use crate::service::{ServiceSource, ServiceStatus};
    use crate::streaming::StreamingCode;

    struct NullSource;
    impl ServiceSource for NullSource {
        fn start_feed(
            &self,
            _svc: &Arc<Service>,
            _instance: u32,
        ) -> Result<(), StreamingCode> {
            Ok(())
        }
        fn stop_feed(&self, _svc: &Arc<Service>) {}
        fn enlist(&self, svc: &Arc<Service>, list: &mut ServiceInstanceList, _flags: u32) {
            list.add(svc, 0, 0, 0);
        }
    }

    fn new_service(ctx: &PvrContext) -> Arc<Service> {
        Service::create(ctx, Box::new(NullSource), None)
    }

    fn sample_record() -> Value {
        json!({
            "pcr": 0x100,
            "pmt": 0x20,
            "stream": [
                {
                    "pid": 0x101, "type": "AAC", "position": 2,
                    "language": "eng", "audio_type": 3
                },
                {
                    "pid": 0x100, "type": "H264", "position": 1,
                    "width": 1920, "height": 1080, "duration": 3600
                },
                {
                    "pid": 0x102, "type": "CA", "position": 3,
                    "caidlist": [ {"caid": 0x0500, "providerid": 0x123456} ]
                },
                {
                    "pid": 0x103, "type": "DVBSUB", "position": 4,
                    "language": "ger", "compositionid": 7, "ancillartyid": 9
                }
            ]
        })
    }

    #[test]
    fn loads_sorts_by_position_and_round_trips() {
        let ctx = PvrContext::new();
        let svc = new_service(&ctx);
        load(&svc, &sample_record());
        {
            let st = svc.state();
            assert_eq!(st.pcr_pid, 0x100);
            assert_eq!(st.pmt_pid, 0x20);
            // sorted by position: video first despite declaration order
            assert_eq!(st.components[0].pid, 0x100);
            assert_eq!(st.components[1].pid, 0x101);
            assert_eq!(st.components[1].lang, "eng");
            assert_eq!(st.components[3].ancillary_id, 9);
        }

        // save -> load -> save is byte identical
        let first = save(&svc);
        let svc2 = new_service(&ctx);
        load(&svc2, &first);
        let second = save(&svc2);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(svc2.state().status, ServiceStatus::Idle);
    }

    #[test]
    fn legacy_caid_keys_load_like_modern_ones() {
        let ctx = PvrContext::new();
        let legacy = json!({
            "stream": [
                { "pid": 0x102, "type": "CA", "position": 1,
                  "caidnum": 0x0602, "caproviderid": 0x42 }
            ]
        });
        let modern = json!({
            "stream": [
                { "pid": 0x102, "type": "CA", "position": 1,
                  "caidlist": [ {"caid": 0x0602, "providerid": 0x42} ] }
            ]
        });
        let a = new_service(&ctx);
        let b = new_service(&ctx);
        load(&a, &legacy);
        load(&b, &modern);
        assert_eq!(a.state().components[0].caids, b.state().components[0].caids);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let ctx = PvrContext::new();
        let svc = new_service(&ctx);
        let conf = json!({
            "stream": [
                { "type": "H264", "position": 1 },            // missing pid
                { "pid": 0x100, "position": 1 },              // missing type
                { "pid": 0x100, "type": "WAT", "position": 1 }, // unknown type
                { "pid": 0x101, "type": "AAC", "position": 1 }
            ]
        });
        load(&svc, &conf);
        assert_eq!(svc.state().components.len(), 1);
        assert_eq!(svc.state().components[0].pid, 0x101);
    }
}
