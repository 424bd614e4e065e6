use super::{Calculation, CalculatedValue};
use crate::bonus::Source;
use crate::changes::ChangeTarget;
use crate::character::RaceData;
use crate::stats::SpeedKind;
use std::collections::BTreeMap;

const ALL_SPEEDS: [SpeedKind; 5] = [
    SpeedKind::Land,
    SpeedKind::Fly,
    SpeedKind::Swim,
    SpeedKind::Climb,
    SpeedKind::Burrow,
];

/// Land speed always exists. Other kinds appear when the race grants them
/// or a change targets them.
pub(crate) fn calculate_speeds(calc: &mut Calculation<'_>) -> BTreeMap<SpeedKind, CalculatedValue> {
    let race: RaceData = calc
        .base
        .race
        .as_ref()
        .and_then(|id| calc.ctx.compendium.get(id))
        .and_then(|race| race.typed())
        .unwrap_or_default();

    let mut speeds = BTreeMap::new();
    for kind in ALL_SPEEDS {
        let base = match kind {
            SpeedKind::Land => Some(race.speeds.get(&kind).copied().unwrap_or(race.base_speed)),
            _ => race.speeds.get(&kind).copied(),
        };
        let changes = calc.sources(|target| matches!(target, ChangeTarget::Speed { speed } if *speed == kind));
        if base.is_none() && changes.is_empty() {
            continue;
        }
        let base = base.unwrap_or(0);
        let mut sources = vec![Source::base("Base speed", base)];
        sources.extend(changes);
        let mut speed = CalculatedValue::from_sources(sources);
        speed.total_value = speed.total_value.max(0);

        let key = kind.key();
        calc.index.set(format!("speed.{key}.base"), base);
        calc.index.set(format!("speed.{key}.total"), speed.total_value);
        speeds.insert(kind, speed);
    }
    speeds
}
