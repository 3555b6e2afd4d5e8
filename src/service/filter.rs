//! Declarative elementary-stream filter.
//!
//! Rules are grouped per component class and applied in declared order to
//! decide which components of a service are forwarded to subscribers. The
//! pass rebuilds the service's filtered list and the per-CAID `in_use`
//! flags; it runs with the service's stream mutex held.

use uuid::Uuid;

use super::stream::{ElementaryStream, StreamType, ESFM_IGNORE, ESFM_USED};

/// Component classes, processed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EsFilterClass {
    /// Video codecs
    Video,
    /// Audio codecs
    Audio,
    /// Teletext pages
    Teletext,
    /// DVB and text subtitles
    Subtit,
    /// Conditional-access streams
    Ca,
    /// Everything else (PCR, PMT)
    Other,
}

impl EsFilterClass {
    /// All classes in processing order.
    pub const ALL: [EsFilterClass; 6] = [
        EsFilterClass::Video,
        EsFilterClass::Audio,
        EsFilterClass::Teletext,
        EsFilterClass::Subtit,
        EsFilterClass::Ca,
        EsFilterClass::Other,
    ];

    /// Component-type mask covered by this class.
    pub fn mask(self) -> u32 {
        match self {
            EsFilterClass::Video => {
                StreamType::Mpeg2Video.mask() | StreamType::H264.mask() | StreamType::Hevc.mask()
            }
            EsFilterClass::Audio => {
                StreamType::Mpeg2Audio.mask()
                    | StreamType::Aac.mask()
                    | StreamType::Ac3.mask()
                    | StreamType::Eac3.mask()
            }
            EsFilterClass::Teletext => StreamType::Teletext.mask(),
            EsFilterClass::Subtit => StreamType::DvbSub.mask() | StreamType::TextSub.mask(),
            EsFilterClass::Ca => StreamType::Ca.mask(),
            EsFilterClass::Other => StreamType::Pcr.mask() | StreamType::Pmt.mask(),
        }
    }

    fn index(self) -> usize {
        match self {
            EsFilterClass::Video => 0,
            EsFilterClass::Audio => 1,
            EsFilterClass::Teletext => 2,
            EsFilterClass::Subtit => 3,
            EsFilterClass::Ca => 4,
            EsFilterClass::Other => 5,
        }
    }

    /// Lowercase label for log lines.
    pub fn label(self) -> &'static str {
        match self {
            EsFilterClass::Video => "video",
            EsFilterClass::Audio => "audio",
            EsFilterClass::Teletext => "teletext",
            EsFilterClass::Subtit => "subtitle",
            EsFilterClass::Ca => "ca",
            EsFilterClass::Other => "other",
        }
    }
}

/// What an elementary-stream filter rule does with a matched component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EsFilterAction {
    /// Match without effect
    #[default]
    None,
    /// Admit the component
    Use,
    /// Admit unless a component of the class was already admitted for the
    /// same language (CA: any prior CA admission); then ignore
    Once,
    /// Admit this component alone, discarding prior admissions of the class
    Exclusive,
    /// Admit only while the class output is still empty
    Empty,
    /// Reject the component
    Ignore,
}

impl EsFilterAction {
    /// Lowercase label for log lines.
    pub fn label(self) -> &'static str {
        match self {
            EsFilterAction::None => "none",
            EsFilterAction::Use => "use",
            EsFilterAction::Once => "once",
            EsFilterAction::Exclusive => "exclusive",
            EsFilterAction::Empty => "empty",
            EsFilterAction::Ignore => "ignore",
        }
    }
}

/// One filter rule.
///
/// Every narrowing field is optional; an unset field matches everything.
/// `sindex` counts matches within one rule application, starting at 1;
/// 0 disables the index filter.
#[derive(Debug, Clone)]
pub struct EsFilter {
    /// Declaration-order index, used in log lines
    pub index: u32,
    /// Class this rule belongs to
    pub class: EsFilterClass,
    /// Disabled rules are skipped
    pub enabled: bool,
    /// Explicit component-type mask, 0 matches any type of the class
    pub type_mask: u32,
    /// Language narrowing, compared over the first four bytes
    pub language: Option<String>,
    /// Service narrowing by UUID
    pub service: Option<Uuid>,
    /// PID narrowing, 0 matches any (only applied with a service match,
    /// or always for CA rules)
    pub pid: u16,
    /// CAID narrowing for CA rules
    pub caid: Option<u16>,
    /// Provider-id narrowing for CA rules
    pub provider: Option<u32>,
    /// Match-index narrowing, 0 disables
    pub sindex: u32,
    /// Rule action
    pub action: EsFilterAction,
    /// Log every match of this rule
    pub log: bool,
}

impl EsFilter {
    /// Creates an enabled rule with the given class and action.
    pub fn new(class: EsFilterClass, action: EsFilterAction) -> Self {
        Self {
            index: 0,
            class,
            enabled: true,
            type_mask: 0,
            language: None,
            service: None,
            pid: 0,
            caid: None,
            provider: None,
            sindex: 0,
            action,
            log: false,
        }
    }

    /// Narrows the rule to one language.
    pub fn with_language(mut self, lang: &str) -> Self {
        self.language = Some(lang.to_owned());
        self
    }

    /// Narrows the rule to one service.
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service = Some(uuid);
        self
    }

    /// Narrows the rule to one CAID.
    pub fn with_caid(mut self, caid: u16) -> Self {
        self.caid = Some(caid);
        self
    }

    /// Narrows the rule to one provider id.
    pub fn with_provider(mut self, provider: u32) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Narrows the rule to one match index (1-based).
    pub fn with_sindex(mut self, sindex: u32) -> Self {
        self.sindex = sindex;
        self
    }

    /// Narrows the rule to an explicit component-type mask.
    pub fn with_type_mask(mut self, mask: u32) -> Self {
        self.type_mask = mask;
        self
    }

    /// Narrows the rule to one PID.
    pub fn with_pid(mut self, pid: u16) -> Self {
        self.pid = pid;
        self
    }
}

/// The full rule set, one ordered list per class.
#[derive(Debug, Default, Clone)]
pub struct EsFilterSet {
    rules: [Vec<EsFilter>; 6],
}

impl EsFilterSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no class has any rule; the filter then passes everything.
    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|r| r.is_empty())
    }

    /// Rules of one class in declared order.
    pub fn rules(&self, class: EsFilterClass) -> &[EsFilter] {
        &self.rules[class.index()]
    }

    /// Appends a rule to its class, assigning the next declaration index.
    pub fn push(&mut self, mut rule: EsFilter) {
        let list = &mut self.rules[rule.class.index()];
        rule.index = list.len() as u32 + 1;
        list.push(rule);
    }

    /// Drops all rules.
    pub fn clear(&mut self) {
        for list in &mut self.rules {
            list.clear();
        }
    }
}

/// Language narrowing over the first four bytes, terminator included, so
/// three-letter codes compare exactly.
fn lang_match(rule: &str, lang: &str) -> bool {
    let a = rule.as_bytes();
    let b = lang.as_bytes();
    for i in 0..4 {
        let ca = a.get(i).copied().unwrap_or(0);
        let cb = b.get(i).copied().unwrap_or(0);
        if ca != cb {
            return false;
        }
        if ca == 0 {
            break;
        }
    }
    true
}

fn admit(comps: &mut [ElementaryStream], filtered: &mut Vec<usize>, pos: usize) {
    // only once
    if comps[pos].filter & ESFM_USED != 0 {
        return;
    }
    comps[pos].filter |= ESFM_USED;
    filtered.push(pos);
}

fn ca_mark(comps: &mut [ElementaryStream], pos: usize, ca_idx: Option<usize>, mark: u8) {
    match ca_idx {
        Some(i) => comps[pos].caids[i].filter |= mark,
        None => {
            for ca in &mut comps[pos].caids {
                ca.filter |= mark;
            }
        }
    }
}

/// Rebuilds `filtered` (positions into `comps`) and the CAID `in_use`
/// flags from the rule set.
///
/// With no rules at all the output equals the input order and every CAID
/// is in use. Otherwise classes are processed in declared order; a class
/// without rules admits its whole mask, a class with rules applies them
/// and then falls back to admitting every unmarked component.
pub fn build_filter(
    comps: &mut [ElementaryStream],
    filtered: &mut Vec<usize>,
    filters: &EsFilterSet,
    service_uuid: &Uuid,
    nicename: &str,
) {
    filtered.clear();

    if filters.is_empty() {
        for (pos, st) in comps.iter_mut().enumerate() {
            filtered.push(pos);
            for ca in &mut st.caids {
                ca.in_use = true;
            }
        }
        return;
    }

    for st in comps.iter_mut() {
        st.filter = 0;
        for ca in &mut st.caids {
            ca.in_use = false;
            ca.filter = 0;
        }
    }

    for class in EsFilterClass::ALL {
        let o = filtered.len();
        let mask = class.mask();
        let rules = filters.rules(class);

        if rules.is_empty() {
            for pos in 0..comps.len() {
                if mask & comps[pos].stream_type.mask() != 0 {
                    admit(comps, filtered, pos);
                    for ca in &mut comps[pos].caids {
                        ca.in_use = true;
                    }
                }
            }
            continue;
        }

        let mut exclusive = false;
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            let mut sindex = 0u32;
            for pos in 0..comps.len() {
                let st_type = comps[pos].stream_type;
                if mask & st_type.mask() == 0 {
                    continue;
                }
                if rule.type_mask != 0 && rule.type_mask & st_type.mask() == 0 {
                    continue;
                }
                if let Some(lang) = &rule.language {
                    if !lang_match(lang, &comps[pos].lang) {
                        continue;
                    }
                }
                if let Some(svc) = &rule.service {
                    if svc != service_uuid {
                        continue;
                    }
                    if rule.pid != 0 && i32::from(rule.pid) != comps[pos].pid {
                        continue;
                    }
                }

                if class == EsFilterClass::Ca {
                    if rule.pid != 0 && i32::from(rule.pid) != comps[pos].pid {
                        continue;
                    }
                    let mut ca_idx: Option<usize> = None;
                    if rule.caid.is_some() || rule.provider.is_some() {
                        ca_idx = comps[pos].caids.iter().position(|c| {
                            rule.caid.map_or(true, |v| c.caid == v)
                                && rule.provider.map_or(true, |v| c.providerid == v)
                        });
                        if ca_idx.is_none() {
                            continue;
                        }
                    }
                    sindex += 1;
                    if rule.sindex != 0 && rule.sindex != sindex {
                        continue;
                    }
                    if rule.log {
                        log::info!(
                            target: "service",
                            "esfilter: {} {:03} {:03} {:05} {:04x} {:06x} \"{}\" {}",
                            class.label(),
                            comps[pos].index,
                            rule.index,
                            comps[pos].pid,
                            rule.caid.unwrap_or(0),
                            rule.provider.unwrap_or(0),
                            nicename,
                            rule.action.label()
                        );
                    }
                    match rule.action {
                        EsFilterAction::None => {}
                        EsFilterAction::Ignore => {
                            ca_mark(comps, pos, ca_idx, ESFM_IGNORE);
                            comps[pos].filter |= ESFM_IGNORE;
                        }
                        EsFilterAction::Once | EsFilterAction::Use => {
                            let dup = rule.action == EsFilterAction::Once
                                && comps.iter().any(|st2| {
                                    st2.stream_type == StreamType::Ca
                                        && st2.filter & ESFM_USED != 0
                                });
                            if dup {
                                ca_mark(comps, pos, ca_idx, ESFM_IGNORE);
                                comps[pos].filter |= ESFM_IGNORE;
                            } else {
                                ca_mark(comps, pos, ca_idx, ESFM_USED);
                                admit(comps, filtered, pos);
                            }
                        }
                        EsFilterAction::Exclusive => match ca_idx {
                            None => {
                                for ca in &mut comps[pos].caids {
                                    ca.in_use = true;
                                }
                            }
                            Some(i) => {
                                for ca in &mut comps[pos].caids {
                                    ca.in_use = false;
                                }
                                comps[pos].caids[i].in_use = true;
                            }
                        },
                        EsFilterAction::Empty => {
                            if filtered.len() == o {
                                admit(comps, filtered, pos);
                            }
                        }
                    }
                } else {
                    sindex += 1;
                    if rule.sindex != 0 && rule.sindex != sindex {
                        continue;
                    }
                    if rule.log {
                        log::info!(
                            target: "service",
                            "esfilter: {} {:03} {:03} {:05} {} {} \"{}\" {}",
                            class.label(),
                            comps[pos].index,
                            rule.index,
                            comps[pos].pid,
                            st_type.as_str(),
                            comps[pos].lang,
                            nicename,
                            rule.action.label()
                        );
                    }
                    match rule.action {
                        EsFilterAction::None => {}
                        EsFilterAction::Ignore => {
                            comps[pos].filter |= ESFM_IGNORE;
                        }
                        EsFilterAction::Once | EsFilterAction::Use => {
                            let lang = comps[pos].lang.clone();
                            let dup = rule.action == EsFilterAction::Once
                                && comps.iter().enumerate().any(|(p2, st2)| {
                                    p2 != pos
                                        && st2.filter & ESFM_USED != 0
                                        && mask & st2.stream_type.mask() != 0
                                        && (rule.language.is_none() || st2.lang == lang)
                                });
                            if dup {
                                comps[pos].filter |= ESFM_IGNORE;
                            } else {
                                admit(comps, filtered, pos);
                            }
                        }
                        EsFilterAction::Exclusive => {}
                        EsFilterAction::Empty => {
                            if filtered.len() == o {
                                admit(comps, filtered, pos);
                            }
                        }
                    }
                }

                if rule.action == EsFilterAction::Exclusive {
                    // forget previous work of this class
                    for p in filtered.drain(o..) {
                        for ca in &mut comps[p].caids {
                            ca.in_use = false;
                        }
                    }
                    comps[pos].filter = 0;
                    admit(comps, filtered, pos);
                    exclusive = true;
                    break;
                }
            }
            if exclusive {
                break;
            }
        }

        if !exclusive {
            for pos in 0..comps.len() {
                let in_mask = mask & comps[pos].stream_type.mask() != 0;
                if in_mask && comps[pos].filter & (ESFM_USED | ESFM_IGNORE) == 0 {
                    admit(comps, filtered, pos);
                    for ca in &mut comps[pos].caids {
                        ca.in_use = true;
                    }
                } else {
                    for ca in &mut comps[pos].caids {
                        if ca.filter & ESFM_USED != 0 {
                            ca.in_use = true;
                        }
                    }
                }
            }
        }
    }
}
