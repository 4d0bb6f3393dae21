#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scope {
    Root,
    Details,
    NestedDetails,
    DataDetails,
    Data,
    LineOptions,
    SelectionFlow,
}

#[derive(Copy, Clone, Debug)]
pub struct Lookup {
    pub scope: Scope,
    pub keys: &'static [&'static str],
}

const fn lookup(scope: Scope, keys: &'static [&'static str]) -> Lookup {
    Lookup { scope, keys }
}

pub const PD_RIGHT: &[Lookup] = &[
    lookup(
        Scope::Root,
        &["pdRight", "pdOD", "pd_right", "pd_right_mm", "pd_od", "right"],
    ),
    lookup(
        Scope::Details,
        &["pdRight", "pdOD", "pd_right", "pd_right_mm", "right"],
    ),
    lookup(Scope::NestedDetails, &["pdRight", "pdOD", "pd_right"]),
    lookup(Scope::DataDetails, &["pdRight", "pdOD", "pd_right"]),
    lookup(Scope::Data, &["pdRight", "pdOD", "pd_right", "pd_right_mm"]),
    lookup(
        Scope::LineOptions,
        &["pd_right_mm", "pd_right", "pdRight", "pdOD", "pd_od"],
    ),
    lookup(Scope::SelectionFlow, &["pdRight", "pd_right"]),
];

pub const PD_LEFT: &[Lookup] = &[
    lookup(
        Scope::Root,
        &["pdLeft", "pdOS", "pd_left", "pd_left_mm", "pd_os", "left"],
    ),
    lookup(
        Scope::Details,
        &["pdLeft", "pdOS", "pd_left", "pd_left_mm", "left"],
    ),
    lookup(Scope::NestedDetails, &["pdLeft", "pdOS", "pd_left"]),
    lookup(Scope::DataDetails, &["pdLeft", "pdOS", "pd_left"]),
    lookup(Scope::Data, &["pdLeft", "pdOS", "pd_left", "pd_left_mm"]),
    lookup(
        Scope::LineOptions,
        &["pd_left_mm", "pd_left", "pdLeft", "pdOS", "pd_os"],
    ),
    lookup(Scope::SelectionFlow, &["pdLeft", "pd_left"]),
];

pub const PD_SINGLE: &[Lookup] = &[
    lookup(
        Scope::Root,
        &["pdSingle", "pd_single", "pd_single_mm", "totalPD", "single"],
    ),
    lookup(
        Scope::Details,
        &["pdSingle", "pd_single", "pd_single_mm", "totalPD", "single"],
    ),
    lookup(Scope::NestedDetails, &["pdSingle", "pd_single", "totalPD"]),
    lookup(Scope::DataDetails, &["pdSingle", "pd_single", "totalPD"]),
    lookup(
        Scope::Data,
        &["pdSingle", "pd_single", "pd_single_mm", "totalPD"],
    ),
    lookup(
        Scope::LineOptions,
        &["pd_single_mm", "pd_single", "pdSingle"],
    ),
    lookup(Scope::SelectionFlow, &["pdSingle", "pd_single"]),
];

pub const PD_MODE: &[Lookup] = &[
    lookup(Scope::Root, &["pdType", "pd_type"]),
    lookup(Scope::Details, &["pdType", "pd_type"]),
    lookup(Scope::NestedDetails, &["pdType"]),
    lookup(Scope::DataDetails, &["pdType"]),
    lookup(Scope::Data, &["pdType", "pd_type"]),
    lookup(Scope::LineOptions, &["pd_type", "pdType"]),
    lookup(Scope::SelectionFlow, &["pdType"]),
];

pub const CANONICAL_RIGHT: &str = "pdRight";
pub const CANONICAL_LEFT: &str = "pdLeft";
pub const CANONICAL_SINGLE: &str = "pdSingle";
pub const CANONICAL_MODE: &str = "pdType";
