//! Criterion benchmarks for the simulation core's hot paths.
//!
//! Benchmarks:
//! 1. from-orders driver, single column, buy-and-hold
//! 2. from-orders driver, cash-sharing group with auto call sequence
//! 3. entry-trade aggregation over a long fill history

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use simcore::domain::enums::{CallSeqType, Direction, OrderSide, SizeType};
use simcore::domain::order::OrderRequest;
use simcore::domain::records::OrderRecord;
use simcore::flex::FlexArray;
use simcore::sim::engine::OhlcData;
use simcore::sim::{simulate_from_orders, SimConfig};
use simcore::aggregate::build_entry_trades;

fn sine_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + (i as f64 * 0.05).sin() * 5.0).collect()
}

fn single_column_config(bars: usize) -> SimConfig {
    SimConfig {
        target_shape: (bars, 1),
        group_lens: vec![1],
        cash_sharing: false,
        init_cash: FlexArray::scalar(100_000.0),
        init_position: FlexArray::scalar(0.0),
        call_seq_type: CallSeqType::Default,
        call_seq: None,
        segment_mask: FlexArray::scalar(1.0),
        ffill_val_price: true,
        update_value: true,
        fill_pos_record: true,
        flex_2d: false,
        max_orders: None,
        max_logs: None,
        master_seed: 7,
    }
}

fn bench_from_orders_buy_and_hold(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_orders_buy_and_hold");

    for &bars in &[252usize, 1260, 2520] {
        let cfg = single_column_config(bars);
        let closes = sine_closes(bars);
        let prices = OhlcData {
            open: FlexArray::one_d(closes.clone()),
            high: FlexArray::one_d(closes.clone()),
            low: FlexArray::one_d(closes.clone()),
            close: FlexArray::one_d(closes),
        };
        let orders = move |bar: usize, _col: usize| {
            if bar == 0 {
                OrderRequest::market(f64::INFINITY, SizeType::Amount, Direction::LongOnly)
            } else {
                let mut o = OrderRequest::market(0.0, SizeType::Amount, Direction::LongOnly);
                o.log = false;
                o
            }
        };

        group.bench_with_input(BenchmarkId::new("bars", bars), &bars, |b, _| {
            b.iter(|| simulate_from_orders(black_box(&cfg), black_box(&prices), &orders, 0).unwrap());
        });
    }

    group.finish();
}

fn bench_from_orders_cash_sharing(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_orders_cash_sharing_auto_seq");

    let cols = 20usize;
    let bars = 504usize;
    let mut cfg = single_column_config(bars);
    cfg.target_shape = (bars, cols);
    cfg.group_lens = vec![cols];
    cfg.cash_sharing = true;
    cfg.call_seq_type = CallSeqType::Auto;

    let closes = sine_closes(bars);
    let prices = OhlcData {
        open: FlexArray::one_d(closes.clone()),
        high: FlexArray::one_d(closes.clone()),
        low: FlexArray::one_d(closes.clone()),
        close: FlexArray::one_d(closes),
    };
    let orders = |bar: usize, col: usize| {
        if bar % 10 == col % 10 {
            OrderRequest::market(1_000.0 * if col % 2 == 0 { 1.0 } else { -1.0 }, SizeType::Value, Direction::Both)
        } else {
            let mut o = OrderRequest::market(0.0, SizeType::Amount, Direction::Both);
            o.log = false;
            o
        }
    };

    group.bench_function("20_columns_504_bars", |b| {
        b.iter(|| simulate_from_orders(black_box(&cfg), black_box(&prices), &orders, 0).unwrap());
    });

    group.finish();
}

fn make_fill_history(n: usize) -> Vec<OrderRecord> {
    (0..n)
        .map(|i| OrderRecord {
            id: i as i64,
            col: 0,
            idx: i as i64,
            size: 10.0,
            price: 100.0 + (i as f64 * 0.1),
            fees: 0.01,
            side: if i % 3 == 0 { OrderSide::Sell } else { OrderSide::Buy },
        })
        .collect()
}

fn bench_entry_trade_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_trade_aggregation");

    for &n in &[1_000usize, 10_000, 50_000] {
        let recs = make_fill_history(n);
        group.bench_with_input(BenchmarkId::new("fills", n), &n, |b, _| {
            b.iter(|| build_entry_trades(0, black_box(&recs), n as i64, 105.0));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_from_orders_buy_and_hold, bench_from_orders_cash_sharing, bench_entry_trade_aggregation);
criterion_main!(benches);
