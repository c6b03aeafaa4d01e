use formualizer_calc::literal::{iso_date_serial, render_literal};
use formualizer_calc::{
    CalculationOutcome, CalculationRequest, CellValue, FormualizerFactory, Limits,
    VariableValue, run_calculation,
};
use proptest::prelude::*;

fn calculate(request: &CalculationRequest) -> CalculationOutcome {
    run_calculation(&FormualizerFactory, request, &Limits::default())
}

fn variable() -> impl Strategy<Value = (VariableValue, CellValue)> {
    prop_oneof![
        (-1_000_000i64..1_000_000).prop_map(|n| {
            let n = n as f64 / 100.0;
            (VariableValue::Number(n), CellValue::Number(n))
        }),
        any::<bool>().prop_map(|b| (VariableValue::Boolean(b), CellValue::Boolean(b))),
        "[A-Za-z0-9 \"]{1,12}".prop_map(|s| (VariableValue::Text(s.clone()), CellValue::Text(s))),
        (1950i32..2100, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| {
            let text = format!("{y:04}-{m:02}-{d:02}");
            let serial = iso_date_serial(&text).unwrap();
            (VariableValue::Text(text), CellValue::Number(serial))
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn variables_evaluate_like_their_literals(
        key in "[A-Za-z_][A-Za-z0-9_]{0,10}",
        (value, expected) in variable(),
    ) {
        let request = CalculationRequest::new(format!("#{key}"))
            .with_variable(key.clone(), value.clone());
        let bound = calculate(&request);
        prop_assert_eq!(bound.value(), Some(&expected));

        let inlined = calculate(&CalculationRequest::new(render_literal(&value)));
        prop_assert_eq!(bound, inlined);
    }
}

#[test]
fn variables_compare_equal_to_their_literals() {
    let cases: [(VariableValue, &str); 4] = [
        (12.5.into(), "12.5"),
        (true.into(), "TRUE"),
        ("a \"quoted\" word".into(), "\"a \"\"quoted\"\" word\""),
        ("2024-02-29".into(), "45351"),
    ];
    for (value, literal) in cases {
        let request = CalculationRequest::new(format!("IF(#v = {literal}, \"same\", \"different\")"))
            .with_variable("v", value);
        assert_eq!(
            calculate(&request),
            CalculationOutcome::success(CellValue::Text("same".into()))
        );
    }
}
