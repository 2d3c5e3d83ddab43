use gymnasium::*;

pub const GYM_SERVER: &str = "http://127.0.0.1:40004";

#[allow(dead_code)]
pub fn discrete_value(space: &ObsActSpace) -> Discrete {
    match space {
        ObsActSpace::Discrete { n } => *n,
        _ => panic!("{space:?} is not ObsActSpace::Discrete."),
    }
}

#[allow(dead_code)]
pub fn box_value(space: &ObsActSpace) -> (Vec<Discrete>, Vec<Continous>, Vec<Continous>) {
    match space {
        ObsActSpace::Box { shape, high, low } => (shape.clone(), high.clone(), low.clone()),
        _ => panic!("{space:?} is not ObsActSpace::Box."),
    }
}

#[allow(dead_code)]
pub fn discrete_item_value(item: &ObsActSpaceItem) -> Discrete {
    item.discrete_value()
        .unwrap_or_else(|| panic!("{item:?} is not ObsActSpaceItem::Discrete."))
}

#[allow(dead_code)]
pub fn continous_items_values(items: &[ObsActSpaceItem]) -> Vec<Continous> {
    items
        .iter()
        .map(|item| {
            item.box_value()
                .unwrap_or_else(|| panic!("{item:?} is not ObsActSpaceItem::Continous."))
        })
        .collect()
}
