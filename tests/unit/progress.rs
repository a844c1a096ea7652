use super::*;

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
    let mut out = Vec::new();
    while let Ok(u) = rx.try_recv() {
        out.push(u);
    }
    out
}

#[test]
fn report_never_reaches_100() {
    let (p, mut rx) = ProgressReporter::channel();
    p.report(1.0, "almost");
    let updates = drain(&mut rx);
    assert_eq!(updates.len(), 1);
    assert!(updates[0].percent().unwrap() < 100.0);

    p.complete("done");
    assert_eq!(drain(&mut rx)[0].percent(), Some(100.0));
}

#[test]
fn sink_can_report_from_inside_its_callback() {
    let reporter: Arc<std::sync::OnceLock<ProgressReporter>> = Arc::default();
    let seen: Arc<std::sync::Mutex<Vec<(f64, String)>>> = Arc::default();

    let p = {
        let reporter = Arc::clone(&reporter);
        let seen = Arc::clone(&seen);
        ProgressReporter::new(move |update: ProgressUpdate| {
            let ProgressUpdate::Progress(ev) = update else {
                return;
            };
            seen.lock().unwrap().push((ev.percent, ev.status.clone()));
            if ev.status == "outer" {
                reporter.get().unwrap().report(0.3, "nested");
            }
        })
    };
    reporter.set(p.clone()).unwrap();

    p.report(0.6, "outer");
    p.report(0.7, "after");

    let seen = seen.lock().unwrap().clone();
    let statuses: Vec<&str> = seen.iter().map(|(_, s)| s.as_str()).collect();
    assert_eq!(statuses, ["outer", "nested", "after"]);
    // The nested report asked for 30% but never goes below what was already delivered.
    let pcts: Vec<f64> = seen.iter().map(|(p, _)| *p).collect();
    assert_eq!(pcts, [60.0, 60.0, 70.0]);
}

#[test]
fn scopes_map_into_parent_range() {
    let (p, mut rx) = ProgressReporter::channel();
    let second_half = p.scope(0.5, 1.0);
    second_half.report(0.5, "halfway through second half");
    assert_eq!(drain(&mut rx)[0].percent(), Some(75.0));

    let nested = second_half.scope(0.0, 0.5);
    nested.complete("nested done");
    assert_eq!(drain(&mut rx)[0].percent(), Some(75.0));
}

#[test]
fn stream_is_monotonic_across_scopes() {
    let (p, mut rx) = ProgressReporter::channel();
    p.scope(0.0, 0.5).report(1.0, "capture done");
    // A later phase reporting a lower value does not move the stream backwards.
    p.scope(0.0, 0.2).report(0.1, "late straggler");
    let pcts: Vec<f64> = drain(&mut rx).iter().filter_map(|u| u.percent()).collect();
    assert_eq!(pcts, vec![50.0, 50.0]);
}

#[test]
fn failure_is_a_distinct_event() {
    let (p, mut rx) = ProgressReporter::channel();
    p.report(0.3, "working");
    p.fail("codec exploded");
    let updates = drain(&mut rx);
    assert_eq!(
        updates[1],
        ProgressUpdate::Failed {
            message: "codec exploded".to_string()
        }
    );
    assert!(updates.iter().all(|u| u.percent() != Some(100.0)));
}

#[test]
fn closure_sinks_receive_updates() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let p = ProgressReporter::new(move |u: ProgressUpdate| seen2.lock().unwrap().push(u));
    p.report(0.2, "a");
    p.complete("b");
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn ticker_emits_min_ticks_for_short_runs() {
    let mut t = Ticker::new(1, 10);
    let fractions = t.advance(1);
    assert_eq!(fractions.len(), 10);
    assert_eq!(*fractions.last().unwrap(), 1.0);
    assert!(t.advance(1).is_empty());
}

#[test]
fn ticker_emits_one_tick_per_unit_for_long_runs() {
    let mut t = Ticker::new(40, 10);
    let mut total = 0;
    for done in 1..=40 {
        let f = t.advance(done);
        assert_eq!(f.len(), 1);
        total += f.len();
    }
    assert_eq!(total, 40);
}

#[test]
fn ticker_spreads_ticks_over_few_units() {
    let mut t = Ticker::new(3, 10);
    let counts: Vec<usize> = (1..=3).map(|d| t.advance(d).len()).collect();
    assert_eq!(counts.iter().sum::<usize>(), 10);
    assert!(counts.iter().all(|c| *c >= 3));
}
