//! Benchmark: forward marshalling of a typical component property set.
//!
//! Run with: `cargo bench -p vhb-core --bench marshal_bench`

use std::collections::BTreeMap;
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use vhb_core::value::{Dimension, FILTER_SOURCE_PREVIOUS, Filter};
use vhb_core::{Color, DynamicValue, Metrics, MetricsTransform, Radii, Rect, to_host_value};

fn component_properties() -> DynamicValue {
    let mut map = BTreeMap::new();
    map.insert("bounds".to_owned(), Rect::new(0.0, 0.0, 320.0, 240.0).into());
    map.insert("borderRadii".to_owned(), Radii::uniform(8.0).into());
    map.insert("backgroundColor".to_owned(), Color::from_rgba(10, 20, 30, 255).into());
    map.insert("opacity".to_owned(), 0.75.into());
    map.insert("text".to_owned(), "Hello viewhost".into());
    map.insert(
        "filters".to_owned(),
        DynamicValue::Array(vec![
            Filter::Blur {
                radius: Dimension::Absolute(4.0),
                source: FILTER_SOURCE_PREVIOUS,
            }
            .into(),
            Filter::Grayscale {
                amount: 0.3,
                source: FILTER_SOURCE_PREVIOUS,
            }
            .into(),
        ]),
    );
    DynamicValue::Map(map)
}

fn bench_marshal(c: &mut Criterion) {
    let transform = MetricsTransform::new(&Metrics::new(1280.0, 800.0, 240.0));
    let props = component_properties();

    c.bench_function("to_host_value/component_props", |b| {
        b.iter(|| black_box(to_host_value(black_box(&props), Some(&transform))))
    });
    c.bench_function("to_host_value/component_props_unscaled", |b| {
        b.iter(|| black_box(to_host_value(black_box(&props), None)))
    });
}

criterion_group!(benches, bench_marshal);
criterion_main!(benches);
