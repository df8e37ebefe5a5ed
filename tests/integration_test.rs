// Sessions driven through the host hooks, end to end.
use std::sync::Arc;

use rusty_fork::rusty_fork_test;
use rss_trace::test_utils::{parse_records, RecordingHost, ScriptedProbe};
use rss_trace::{
    end_top, log_file_path_profile, log_file_path_trace, profile_depth, trace_depth, Error,
    EventKind, Frame, Session, SessionConfig, SessionKind, TraceEvent, LOG_DIR_ENV,
};

fn event(kind: EventKind, line: u32) -> TraceEvent<'static> {
    TraceEvent::new(kind, Frame::new("populate.py", line, "populate_list"))
}

fn start(
    kind: SessionKind,
    config: SessionConfig,
    host: &Arc<RecordingHost>,
    probe: &ScriptedProbe,
) -> Session {
    Session::start_with_probe(kind, &config, host.clone(), Box::new(probe.clone())).unwrap()
}

// The session stacks are process-wide, so every test runs in its own process.
rusty_fork_test! {
    #[test]
    fn profile_session_through_hook() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        host.set_frame(Some(Frame::new("main.py", 3, "<module>")));
        let probe = ScriptedProbe::new(0);
        let path = tmp.path().join("profile.log");

        let config = SessionConfig::new()
            .d_rss_trigger(0)
            .message("test_profile_0_populate_list()")
            .filepath(&path);
        let mut session = start(SessionKind::Profile, config, &host, &probe);
        assert!(host.is_hooked(SessionKind::Profile));
        assert!(!host.is_hooked(SessionKind::Trace));
        assert_eq!(log_file_path_profile(), Some(path.clone()));
        assert_eq!(log_file_path_trace(), None);

        for (rss, line) in [(1000, 10), (1000, 11), (2000, 12)] {
            probe.set_rss(rss);
            assert!(host.fire(SessionKind::Profile, &event(EventKind::Call, line)));
        }
        // not delivered to profile hooks
        probe.set_rss(50_000);
        host.fire(SessionKind::Profile, &event(EventKind::Line, 13));

        session.end().unwrap();
        assert!(!host.is_hooked(SessionKind::Profile));
        assert_eq!(profile_depth(), 0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("test_profile_0_populate_list()\nSOF\n"));
        assert!(text.ends_with("EOF\n"));

        let records = parse_records(&text);
        let next: Vec<_> = records.iter().filter(|r| r.tag == "NEXT:").collect();
        assert_eq!(next.iter().map(|r| r.d_rss).collect::<Vec<_>>(), [1000, 0, 1000]);
        assert_eq!(next.iter().map(|r| r.d_seq).collect::<Vec<_>>(), [1, 1, 1]);
        assert_eq!(records.first().unwrap().file, "main.py");
        assert_eq!(records.last().unwrap().tag, "LAST:");
        assert_eq!(records.last().unwrap().seq, 4);
    }

    #[test]
    fn trace_session_gap_fill() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);
        let path = tmp.path().join("trace.log");

        let config = SessionConfig::new().d_rss_trigger(4096).filepath(&path);
        let mut session = start(SessionKind::Trace, config, &host, &probe);

        let mut rss = 0u64;
        for (i, delta) in [10i64, 5000, 10, 10, -5000].into_iter().enumerate() {
            rss = rss.checked_add_signed(delta).unwrap();
            probe.set_rss(rss);
            host.fire(SessionKind::Trace, &event(EventKind::Line, i as u32 + 1));
        }
        // native events never reach trace hooks
        probe.set_rss(1 << 30);
        host.fire(SessionKind::Trace, &event(EventKind::CCall, 99));
        session.end().unwrap();

        let records = parse_records(&std::fs::read_to_string(&path).unwrap());
        let tagged: Vec<(&str, u64)> = records.iter().map(|r| (r.tag.as_str(), r.seq)).collect();
        assert_eq!(
            tagged,
            [("FRST:", 0), ("PREV:", 1), ("NEXT:", 2), ("PREV:", 4), ("NEXT:", 5), ("LAST:", 6)]
        );
    }

    #[test]
    fn nested_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var(LOG_DIR_ENV, tmp.path());
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);

        assert_eq!(profile_depth(), 0);
        let mut outer = start(SessionKind::Profile, SessionConfig::new().d_rss_trigger(0), &host, &probe);
        assert_eq!(profile_depth(), 1);
        let mut inner = start(SessionKind::Profile, SessionConfig::new().d_rss_trigger(0), &host, &probe);
        assert_eq!(profile_depth(), 2);
        assert_eq!(trace_depth(), 0);
        assert_eq!(outer.depth(), 1);
        assert_eq!(inner.depth(), 2);
        assert_ne!(outer.log_file_path(), inner.log_file_path());
        assert_eq!(log_file_path_profile().as_deref(), Some(inner.log_file_path()));

        let outer_name = outer.log_file_path().file_name().unwrap().to_string_lossy().into_owned();
        let inner_name = inner.log_file_path().file_name().unwrap().to_string_lossy().into_owned();
        let pid = std::process::id();
        assert!(outer_name.ends_with(&format!("_{pid}_P_1_3.12.1.log")));
        assert!(inner_name.ends_with(&format!("_{pid}_P_2_3.12.1.log")));

        // only the innermost session sees events
        probe.set_rss(100);
        host.fire(SessionKind::Profile, &event(EventKind::Call, 1));

        // ending the outer session first is refused
        let err = outer.end().unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { depth: 1, top: 2, .. }));
        assert_eq!(profile_depth(), 2);
        assert!(host.is_hooked(SessionKind::Profile));

        inner.end().unwrap();
        assert_eq!(profile_depth(), 1);
        assert!(host.is_hooked(SessionKind::Profile));
        assert!(std::fs::read_to_string(inner.log_file_path()).unwrap().ends_with("EOF\n"));
        assert!(!std::fs::read_to_string(outer.log_file_path()).unwrap().contains("EOF"));

        outer.end().unwrap();
        assert_eq!(profile_depth(), 0);
        assert!(!host.is_hooked(SessionKind::Profile));

        let inner_records = parse_records(&std::fs::read_to_string(inner.log_file_path()).unwrap());
        let outer_records = parse_records(&std::fs::read_to_string(outer.log_file_path()).unwrap());
        assert!(inner_records.iter().any(|r| r.tag == "NEXT:"));
        assert!(outer_records.iter().all(|r| r.tag != "NEXT:"));
    }

    #[test]
    fn dropping_a_handle_ends_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);
        let path = tmp.path().join("scoped.log");
        {
            let _session = start(SessionKind::Trace, SessionConfig::new().filepath(&path), &host, &probe);
            assert_eq!(trace_depth(), 1);
        }
        assert_eq!(trace_depth(), 0);
        assert_eq!(host.installs(), [(SessionKind::Trace, true), (SessionKind::Trace, false)]);
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("EOF\n"));
    }

    #[test]
    fn failed_start_leaves_no_session() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let path = tmp.path().join("no_such_dir").join("x.log");

        let result = Session::start(SessionKind::Profile, &SessionConfig::new().filepath(&path), host.clone());
        assert!(matches!(result, Err(Error::Open { .. })));

        let result = Session::start(SessionKind::Profile, &SessionConfig::new().filepath(""), host.clone());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        assert_eq!(profile_depth(), 0);
        assert!(host.installs().is_empty());
    }

    #[test]
    fn end_top_without_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);

        assert!(matches!(end_top(SessionKind::Trace, host.as_ref()), Err(Error::EmptyStack(SessionKind::Trace))));
        assert!(!host.is_hooked(SessionKind::Trace));

        let path = tmp.path().join("top.log");
        let mut session = start(SessionKind::Trace, SessionConfig::new().filepath(&path), &host, &probe);
        assert_eq!(end_top(SessionKind::Trace, host.as_ref()).unwrap(), path);
        assert_eq!(trace_depth(), 0);
        assert!(!host.is_hooked(SessionKind::Trace));

        // the handle sees its session already ended
        session.end().unwrap();
        assert!(session.is_ended());
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("LAST:").count(), 1);
    }

    #[test]
    fn write_to_log_through_session() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);
        let path = tmp.path().join("inline.log");

        let mut session = start(SessionKind::Profile, SessionConfig::new().filepath(&path), &host, &probe);
        session.write_to_log("test_profile_inline_message_to_log_file():\n").unwrap();
        let trigger = session.with_writer(|writer| writer.d_rss_trigger()).unwrap();
        assert_eq!(trigger, rss_trace::page_size());
        session.end().unwrap();

        assert!(matches!(session.write_to_log("late"), Err(Error::Closed)));
        assert!(session.with_writer(|writer| writer.event_number()).is_none());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("test_profile_inline_message_to_log_file():\n"));
    }

    #[test]
    fn profile_and_trace_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);

        let mut profile = start(
            SessionKind::Profile,
            SessionConfig::new().d_rss_trigger(0).filepath(tmp.path().join("p.log")),
            &host,
            &probe,
        );
        let mut trace = start(
            SessionKind::Trace,
            SessionConfig::new().d_rss_trigger(0).filepath(tmp.path().join("t.log")),
            &host,
            &probe,
        );
        assert_eq!((profile_depth(), trace_depth()), (1, 1));

        probe.set_rss(10);
        host.fire(SessionKind::Trace, &event(EventKind::Line, 1));
        host.fire(SessionKind::Trace, &event(EventKind::Line, 2));
        host.fire(SessionKind::Profile, &event(EventKind::CCall, 3));

        // ending in either order is fine across kinds
        profile.end().unwrap();
        trace.end().unwrap();

        let p = parse_records(&std::fs::read_to_string(tmp.path().join("p.log")).unwrap());
        let t = parse_records(&std::fs::read_to_string(tmp.path().join("t.log")).unwrap());
        assert_eq!(p.iter().filter(|r| r.tag == "NEXT:").count(), 1);
        assert_eq!(t.iter().filter(|r| r.tag == "NEXT:").count(), 2);
        assert_eq!(p.iter().find(|r| r.tag == "NEXT:").unwrap().what, "C_CALL");
    }

    #[test]
    fn dropping_outer_handle_first_closes_its_log() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);
        let outer_path = tmp.path().join("outer.log");
        let inner_path = tmp.path().join("inner.log");

        let outer = start(SessionKind::Trace, SessionConfig::new().d_rss_trigger(0).filepath(&outer_path), &host, &probe);
        let mut inner = start(SessionKind::Trace, SessionConfig::new().d_rss_trigger(0).filepath(&inner_path), &host, &probe);

        drop(outer);
        assert_eq!(trace_depth(), 1);
        assert_eq!(log_file_path_trace(), Some(inner_path.clone()));
        assert!(host.is_hooked(SessionKind::Trace));
        assert!(std::fs::read_to_string(&outer_path).unwrap().ends_with("EOF\n"));

        probe.set_rss(100);
        host.fire(SessionKind::Trace, &event(EventKind::Line, 1));
        inner.end().unwrap();
        assert_eq!(trace_depth(), 0);
        assert!(!host.is_hooked(SessionKind::Trace));

        let outer_records = parse_records(&std::fs::read_to_string(&outer_path).unwrap());
        let inner_records = parse_records(&std::fs::read_to_string(&inner_path).unwrap());
        assert!(outer_records.iter().all(|r| r.tag != "NEXT:"));
        assert_eq!(outer_records.iter().filter(|r| r.tag == "LAST:").count(), 1);
        assert_eq!(inner_records.iter().filter(|r| r.tag == "NEXT:").count(), 1);
    }

    #[test]
    fn open_session_log_is_readable_before_it_ends() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(RecordingHost::new("3.12.1"));
        let probe = ScriptedProbe::new(0);
        let path = tmp.path().join("running.log");

        let session = start(SessionKind::Profile, SessionConfig::new().d_rss_trigger(0).filepath(&path), &host, &probe);
        for line in 1..=20 {
            probe.set_rss(line * 1000);
            host.fire(SessionKind::Profile, &event(EventKind::Call, line as u32));
        }
        // the process may exit with the session still open
        std::mem::forget(session);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("EOF"));
        let records = parse_records(&text);
        assert_eq!(records.iter().filter(|r| r.tag == "NEXT:").count(), 20);
        assert_eq!(profile_depth(), 1);
    }
}
