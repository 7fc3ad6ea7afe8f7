use sensibo_watch::format::{fahrenheit, TemperatureDisplay, Unit};
use sensibo_watch::{Measurement, Temperature};

#[test]
fn fahrenheit_reference_points() {
    assert_eq!(fahrenheit(0.0), 32.0);
    assert_eq!(fahrenheit(100.0), 212.0);
    assert_eq!(fahrenheit(23.0), 73.4);
    assert_eq!(fahrenheit(-40.0), -40.0);
}

#[test]
fn fahrenheit_rounds_to_one_decimal() {
    // 21.37C = 70.466F
    assert_eq!(fahrenheit(21.37), 70.5);
    assert_eq!(Temperature::from_celsius(21.37).fahrenheit(), 70.5);
}

#[test]
fn temperature_display() {
    let t = Temperature::from_celsius(22.5);
    assert_eq!(format!("{t}"), "22.5\u{00b0}C");
}

#[test]
fn dual_unit_embeds_same_celsius_value() {
    let display = TemperatureDisplay::new(Unit::Both, true);
    for c in [-5.0, 0.0, 17.0, 23.0, 26.4, 35.0] {
        let s = display.format(Temperature::from_celsius(c));
        let (f_half, c_half) = s.split_once(" / ").expect("dual output has a separator");
        let f: f64 = f_half.parse().unwrap();
        let parsed_c: f64 = c_half.parse().unwrap();
        assert_eq!(parsed_c, c);
        assert!(((f - 32.0) * 5.0 / 9.0 - c).abs() < 0.1, "{s}");
    }
}

#[test]
fn dual_unit_verbose() {
    let display = TemperatureDisplay::new(Unit::Both, false);
    let s = display
        .format_measurement(&Measurement::with_temperature(23.0))
        .unwrap();
    assert_eq!(s, "73.4\u{00b0}F / 23.0\u{00b0}C");
}
