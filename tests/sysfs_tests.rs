use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use gpiokit::{
    CdevRef, DigitalPinProvider, DigitalPinRegistry, DigitalPinner, EdgeDetect, EdgeEventHandler,
    Error, PinDefinition, PinDefinitions, SysfsAccess, SysfsPin, with_active_low,
    with_direction_input, with_direction_output, with_edge_both, with_poll_for_edge_detection,
};

// mirrors the file tree the kernel would populate after an export
fn fake_sysfs(root: &Path, line: u32) {
    let _ = env_logger::builder().is_test(true).try_init();
    fs::create_dir_all(root.join(format!("gpio{line}"))).unwrap();
    fs::write(root.join(format!("gpio{line}/value")), "0").unwrap();
}

fn read_trimmed(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap().trim().to_string()
}

#[test]
fn export_writes_line_number_and_settings() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 17);

    let mut pin = SysfsPin::new(dir.path(), 17);
    pin.apply_options(vec![with_direction_output(1), with_active_low()])
        .unwrap();
    pin.export().unwrap();

    assert_eq!(read_trimmed(dir.path().join("export")), "17");
    assert_eq!(read_trimmed(dir.path().join("gpio17/direction")), "out");
    assert_eq!(read_trimmed(dir.path().join("gpio17/value")), "1");
    assert_eq!(read_trimmed(dir.path().join("gpio17/active_low")), "1");
    assert_eq!(pin.direction(), "out");
}

#[test]
fn write_and_read_go_through_the_value_file() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 5);

    let mut pin = SysfsPin::new(dir.path(), 5);
    pin.apply_options(vec![with_direction_output(0)]).unwrap();
    pin.export().unwrap();

    pin.write(1).unwrap();
    assert_eq!(read_trimmed(dir.path().join("gpio5/value")), "1");
    assert_eq!(pin.read().unwrap(), 1);

    // externally driven level, with the trailing newline sysfs produces
    fs::write(dir.path().join("gpio5/value"), "0\n").unwrap();
    assert_eq!(pin.read().unwrap(), 0);
}

#[test]
fn write_clamps_before_touching_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 5);

    let mut pin = SysfsPin::new(dir.path(), 5);
    pin.apply_options(vec![with_direction_output(0)]).unwrap();
    pin.export().unwrap();

    pin.write(5).unwrap();
    assert_eq!(read_trimmed(dir.path().join("gpio5/value")), "1");
    pin.write(-2).unwrap();
    assert_eq!(read_trimmed(dir.path().join("gpio5/value")), "0");
}

#[test]
fn active_low_change_reconfigures_without_reexport() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 8);

    let mut pin = SysfsPin::new(dir.path(), 8);
    pin.apply_options(vec![with_direction_input()]).unwrap();
    pin.export().unwrap();
    assert_eq!(read_trimmed(dir.path().join("gpio8/active_low")), "0");

    // clear the control file so a second export write would be visible
    fs::write(dir.path().join("export"), "").unwrap();

    pin.apply_options(vec![with_active_low()]).unwrap();
    assert_eq!(read_trimmed(dir.path().join("gpio8/active_low")), "1");
    assert_eq!(read_trimmed(dir.path().join("export")), "");
    assert_eq!(pin.direction(), "in");
}

#[test]
fn unexport_errors_surface_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 3);
    // a directory in place of the control file makes every write fail
    fs::create_dir(dir.path().join("unexport")).unwrap();

    let mut pin = SysfsPin::new(dir.path(), 3);
    pin.export().unwrap();
    let err = pin.unexport().unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn garbage_in_value_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 2);
    fs::write(dir.path().join("gpio2/value"), "garbage\n").unwrap();

    let mut pin = SysfsPin::new(dir.path(), 2);
    pin.export().unwrap();
    assert!(matches!(pin.read().unwrap_err(), Error::Parse { .. }));
}

#[test]
fn polled_edge_detection_reports_transitions() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 6);

    let (tx, rx) = mpsc::channel();
    let handler: EdgeEventHandler = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    let quit = Arc::new(AtomicBool::new(false));

    let mut pin = SysfsPin::new(dir.path(), 6);
    pin.apply_options(vec![
        with_direction_input(),
        with_edge_both(handler),
        with_poll_for_edge_detection(Duration::from_millis(1), quit.clone()),
    ])
    .unwrap();
    pin.export().unwrap();

    // give the poller a chance to observe the low level first
    std::thread::sleep(Duration::from_millis(50));
    fs::write(dir.path().join("gpio6/value"), "1").unwrap();

    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.edge, EdgeDetect::Rising);
    assert_eq!(event.line_offset, 6);
    assert_eq!(event.seqno, 1);

    fs::write(dir.path().join("gpio6/value"), "0").unwrap();
    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.edge, EdgeDetect::Falling);

    quit.store(true, Ordering::Relaxed);
}

#[test]
fn registry_drives_sysfs_pins_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    fake_sysfs(dir.path(), 17);

    let mut defs = PinDefinitions::default();
    defs.insert(
        "7".to_string(),
        PinDefinition {
            sysfs: 17,
            cdev: CdevRef { chip: 0, line: 17 },
        },
    );
    let registry =
        DigitalPinRegistry::new(Box::new(SysfsAccess::new(dir.path())), defs);

    registry.connect().unwrap();
    registry.digital_write("7", 1).unwrap();
    assert_eq!(read_trimmed(dir.path().join("export")), "17");
    assert_eq!(read_trimmed(dir.path().join("gpio17/value")), "1");
    assert_eq!(registry.digital_read("7").unwrap(), 1);

    let pin = registry.digital_pin("7", vec![]).unwrap();
    assert_eq!(pin.lock().direction(), "in");

    registry.finalize().unwrap();
    assert_eq!(read_trimmed(dir.path().join("unexport")), "17");
}
