pub mod detect;
pub mod error;
pub mod level_data;
pub mod mmws;
pub mod resolve;
pub mod score;
pub mod sus;
pub mod usc;

pub use detect::{Format, detect};
pub use error::{Error, Result};
pub use mmws::Flavor;
pub use resolve::{ResolvePolicy, resolve_overlaps};
pub use score::{
    Bpm, Direction, Ease, EndPoint, Event, FadeKind, Guide, GuideColor, GuidePoint, HoldPoint,
    JudgeKind, MetaData, RelayPoint, RelayRole, Score, Single, Slide, StartPoint, TapKind,
    TimeScaleGroup, TimeScalePoint,
};
