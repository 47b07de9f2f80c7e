pub mod deal;
pub mod intent;

pub use deal::{
    Barrier, BarrierInput, BarrierKind, BarrierLevel, BasketType, DealProp, Structure,
    StructureInput, DEFAULT_INITIAL_PRICE,
};
pub use intent::DealIntent;
