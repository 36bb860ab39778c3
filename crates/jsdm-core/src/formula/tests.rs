//! Test suite for the formula module
//!
//! Covers parsing, term expansion and design matrix construction, including
//! edge cases and error conditions.

use crate::data::{DataFrame, DataFrameBuilder, Series};
use crate::design::{PredictorData, expand_predictors};
use crate::formula::*;
use approx::assert_abs_diff_eq;
use ndarray::array;

fn env_data() -> DataFrame {
    DataFrameBuilder::new()
        .with_column("temp", Series::float(vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap()
        .with_column("precip", Series::float(vec![0.5, 1.5, 2.5, 3.5]))
        .unwrap()
        .with_column("elev", Series::int(vec![10, 20, 30, 40]))
        .unwrap()
        .build()
        .unwrap()
}

fn habitat_data() -> DataFrame {
    DataFrameBuilder::new()
        .with_column("temp", Series::float(vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap()
        .with_column("habitat", Series::categorical(&["forest", "grass", "wet", "grass"]))
        .unwrap()
        .build()
        .unwrap()
}

fn names(formula: &str, df: &DataFrame) -> Vec<String> {
    Formula::parse(formula)
        .unwrap()
        .expand(df)
        .unwrap()
        .design_matrix_names(df)
        .unwrap()
}

#[test]
fn test_formula_parsing_basic_syntax() {
    let formula = Formula::parse("y ~ x1 + x2").unwrap();
    assert_eq!(formula.response, Some("y".to_string()));
    assert!(formula.has_response());
    assert_eq!(formula.to_string(), "y ~ x1 + x2");

    let formula = Formula::parse("~ x1 + x2").unwrap();
    assert_eq!(formula.response, None);
    assert_eq!(
        formula.rhs,
        Expr::Sum(vec![
            Expr::Factor(Factor::variable("x1")),
            Expr::Factor(Factor::variable("x2")),
        ])
    );

    // Whitespace is insignificant
    let a = Formula::parse("~temp+precip").unwrap();
    let b = Formula::parse("  ~  temp  +  precip  ").unwrap();
    assert_eq!(a.rhs, b.rhs);
}

#[test]
fn test_formula_parsing_errors() {
    assert!(matches!(Formula::parse(""), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("y x"), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ x +"), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ + x"), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ (x + y"), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ x ) "), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ 2 + x"), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ x^0"), Err(FormulaError::Syntax { .. })));
    assert!(matches!(Formula::parse("~ log(x):y^"), Err(FormulaError::Syntax { .. })));
}

#[test]
fn test_unsupported_function_is_rejected_at_parse_time() {
    assert!(matches!(
        Formula::parse("~ foo(x)"),
        Err(FormulaError::FunctionError { .. })
    ));
    assert!(matches!(
        Formula::parse("~ poly(x)"),
        Err(FormulaError::FunctionError { .. })
    ));
    assert!(matches!(
        Formula::parse("~ log(x, 2)"),
        Err(FormulaError::FunctionError { .. })
    ));
}

#[test]
fn test_default_formula_uses_every_column_with_intercept() {
    let df = env_data();
    let (expanded, design, _) = expand_predictors(PredictorData::from(&df), None).unwrap();

    assert!(expanded.has_intercept);
    assert_eq!(
        design.columns,
        vec!["(Intercept)", "temp", "precip", "elev"]
    );
    assert_eq!(design.values.column(0), array![1.0, 1.0, 1.0, 1.0]);
    assert_eq!(design.values.column(3), array![10.0, 20.0, 30.0, 40.0]);
}

#[test]
fn test_matrix_input_is_coerced_with_synthetic_names() {
    let x = array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]];
    let (_, design, frame) = expand_predictors(PredictorData::from(x), Some("~ X1 + X2:X1")).unwrap();

    assert_eq!(frame.column_names(), vec!["X1", "X2"]);
    assert_eq!(design.columns, vec!["(Intercept)", "X1", "X2:X1"]);
    assert_abs_diff_eq!(design.values[(2, 2)], 0.3, epsilon = 1e-12);
}

#[test]
fn test_intercept_suppression() {
    let df = env_data();
    assert_eq!(names("~ 0 + temp", &df), vec!["temp"]);
    assert_eq!(names("~ temp - 1", &df), vec!["temp"]);
    assert_eq!(names("~ temp + 0", &df), vec!["temp"]);
    assert_eq!(names("~ 1", &df), vec!["(Intercept)"]);
    assert_eq!(names("~ 0", &df), Vec::<String>::new());
    assert_eq!(names("~ -1 + temp", &df), vec!["temp"]);
}

#[test]
fn test_interactions_and_crossing() {
    let df = env_data();
    assert_eq!(
        names("~ temp:precip", &df),
        vec!["(Intercept)", "temp:precip"]
    );
    assert_eq!(
        names("~ temp*precip", &df),
        vec!["(Intercept)", "temp", "precip", "temp:precip"]
    );
    // Higher order terms are placed after main effects
    assert_eq!(
        names("~ temp:precip:elev + temp", &df),
        vec!["(Intercept)", "temp", "temp:precip:elev"]
    );
    // a:b and b:a are the same term
    assert_eq!(
        names("~ temp:precip + precip:temp", &df),
        vec!["(Intercept)", "temp:precip"]
    );
}

#[test]
fn test_interaction_values() {
    let df = env_data();
    let expanded = Formula::parse("~ temp:precip").unwrap().expand(&df).unwrap();
    let design = expanded.design_matrix(&df).unwrap();

    assert_abs_diff_eq!(
        design.values.column(1).to_owned(),
        array![0.5, 3.0, 7.5, 14.0],
        epsilon = 1e-12
    );
}

#[test]
fn test_parenthesized_distribution() {
    let df = env_data();
    assert_eq!(
        names("~ (temp + precip):elev", &df),
        vec!["(Intercept)", "temp:elev", "precip:elev"]
    );
}

#[test]
fn test_crossing_power_of_sum() {
    let df = env_data();
    assert_eq!(
        names("~ (temp + precip + elev)^2", &df),
        vec![
            "(Intercept)",
            "temp",
            "precip",
            "elev",
            "temp:precip",
            "temp:elev",
            "precip:elev"
        ]
    );
}

#[test]
fn test_power_terms() {
    let df = env_data();
    let expanded = Formula::parse("~ temp + temp^2 + I(precip^3)")
        .unwrap()
        .expand(&df)
        .unwrap();
    let design = expanded.design_matrix(&df).unwrap();

    assert_eq!(design.columns, vec!["(Intercept)", "temp", "temp^2", "I(precip^3)"]);
    assert_eq!(design.values.column(2), array![1.0, 4.0, 9.0, 16.0]);
    assert_abs_diff_eq!(design.values[(0, 3)], 0.125, epsilon = 1e-12);
}

#[test]
fn test_oversized_exponents_are_rejected() {
    for formula in ["~ temp^4294967295", "~ temp^2147483648", "~ poly(temp, 3000000000)"] {
        assert!(
            matches!(Formula::parse(formula), Err(FormulaError::Syntax { .. })),
            "{} should not parse",
            formula
        );
    }

    let df = env_data();
    let largest = Formula::parse("~ 0 + temp^2147483647").unwrap().expand(&df).unwrap();
    assert_eq!(largest.design_matrix_names(&df).unwrap(), vec!["temp^2147483647"]);
}

#[test]
fn test_crossing_power_stops_when_saturated() {
    let df = env_data();
    assert_eq!(
        names("~ (temp + precip)^2000000000", &df),
        vec!["(Intercept)", "temp", "precip", "temp:precip"]
    );
    assert_eq!(
        names("~ (temp + precip + elev)^5", &df),
        names("~ (temp + precip + elev)^3", &df)
    );
}

#[test]
fn test_polynomial_terms() {
    let df = env_data();
    let expanded = Formula::parse("~ 0 + poly(temp, 3)").unwrap().expand(&df).unwrap();
    let design = expanded.design_matrix(&df).unwrap();

    assert_eq!(
        design.columns,
        vec!["poly(temp, 3)1", "poly(temp, 3)2", "poly(temp, 3)3"]
    );
    assert_eq!(design.values.row(1), array![2.0, 4.0, 8.0]);
}

#[test]
fn test_function_terms() {
    let df = env_data();
    let expanded = Formula::parse("~ log(temp) + sqrt(precip) + abs(elev)")
        .unwrap()
        .expand(&df)
        .unwrap();
    let design = expanded.design_matrix(&df).unwrap();

    assert_eq!(
        design.columns,
        vec!["(Intercept)", "log(temp)", "sqrt(precip)", "abs(elev)"]
    );
    assert_abs_diff_eq!(design.values[(0, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(design.values[(3, 2)], 3.5f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn test_log_of_non_positive_fails() {
    let df = DataFrame::from_columns(vec![("x", Series::float(vec![1.0, 0.0]))]).unwrap();
    let expanded = Formula::parse("~ log(x)").unwrap().expand(&df).unwrap();
    assert!(matches!(
        expanded.design_matrix(&df),
        Err(FormulaError::NumericalError { .. })
    ));
}

#[test]
fn test_dot_with_removal() {
    let df = env_data();
    assert_eq!(
        names("~ . - elev", &df),
        vec!["(Intercept)", "temp", "precip"]
    );
    // The response is never part of `.`
    assert_eq!(names("temp ~ .", &df), vec!["(Intercept)", "precip", "elev"]);
}

#[test]
fn test_unknown_variable_fails() {
    let df = env_data();
    let result = Formula::parse("~ temp + salinity").unwrap().expand(&df);

    match result {
        Err(FormulaError::VariableNotFound {
            variable,
            available_vars,
        }) => {
            assert_eq!(variable, "salinity");
            assert_eq!(available_vars, vec!["temp", "precip", "elev"]);
        }
        other => panic!("Expected VariableNotFound, got {:?}", other),
    }
}

#[test]
fn test_categorical_treatment_coding() {
    let df = habitat_data();
    let expanded = Formula::parse("~ temp + habitat").unwrap().expand(&df).unwrap();
    let design = expanded.design_matrix(&df).unwrap();

    assert_eq!(
        design.columns,
        vec!["(Intercept)", "temp", "habitat[grass]", "habitat[wet]"]
    );
    assert_eq!(design.values.column(2), array![0.0, 1.0, 0.0, 1.0]);
    assert_eq!(design.values.column(3), array![0.0, 0.0, 1.0, 0.0]);
    assert_eq!(
        expanded.levels.get("habitat").unwrap(),
        &vec!["forest".to_string(), "grass".to_string(), "wet".to_string()]
    );
}

#[test]
fn test_categorical_full_coding_without_intercept() {
    let df = habitat_data();
    assert_eq!(
        names("~ 0 + habitat + temp", &df),
        vec!["habitat[forest]", "habitat[grass]", "habitat[wet]", "temp"]
    );
}

#[test]
fn test_categorical_interaction_names() {
    let df = habitat_data();
    assert_eq!(
        names("~ temp:habitat", &df),
        vec!["(Intercept)", "temp:habitat[grass]", "temp:habitat[wet]"]
    );
}

#[test]
fn test_function_of_factor_is_type_error() {
    let df = habitat_data();
    assert!(matches!(
        Formula::parse("~ log(habitat)").unwrap().expand(&df),
        Err(FormulaError::TypeMismatch { .. })
    ));
}

#[test]
fn test_reapplying_to_new_data_keeps_levels() {
    let train = habitat_data();
    let expanded = Formula::parse("~ habitat").unwrap().expand(&train).unwrap();

    // New data only sees one level but keeps the training layout
    let new = DataFrame::from_columns(vec![(
        "habitat",
        Series::categorical(&["wet", "wet"]),
    )])
    .unwrap();
    let design = expanded.design_matrix(&new).unwrap();
    assert_eq!(
        design.columns,
        vec!["(Intercept)", "habitat[grass]", "habitat[wet]"]
    );
    assert_eq!(design.values.row(0), array![1.0, 0.0, 1.0]);

    let unseen = DataFrame::from_columns(vec![("habitat", Series::categorical(&["alpine"]))])
        .unwrap();
    assert!(matches!(
        expanded.design_matrix(&unseen),
        Err(FormulaError::UnknownLevel { .. })
    ));
}

#[test]
fn test_expansion_is_idempotent() {
    let df = env_data();
    let formula = Formula::parse("~ (temp + precip)^2 + elev + I(temp^2)").unwrap();

    let first = formula.expand(&df).unwrap();
    let second = formula.expand(&df).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.design_matrix_names(&df).unwrap(),
        second.design_matrix_names(&df).unwrap()
    );
}

#[test]
fn test_expanded_formula_display() {
    let df = env_data();
    let expanded = Formula::parse("~ precip:temp + temp - 1")
        .unwrap()
        .expand(&df)
        .unwrap();
    assert_eq!(expanded.to_string(), "~ 0 + temp + precip:temp");
    assert_eq!(expanded.variables(), vec!["temp", "precip"]);
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn expansion_is_a_pure_function_of_schema(
            ncols in 1usize..6,
            degree in 1u32..4,
            nrows in 1usize..8,
        ) {
            let values = ndarray::Array2::from_shape_fn((nrows, ncols), |(i, j)| (i * ncols + j) as f64);
            let df = DataFrame::from_matrix::<&str>(&values, None).unwrap();
            let names: Vec<String> = DataFrame::synthetic_names(ncols);
            let text = format!("~ ({})^{}", names.join(" + "), degree);
            let formula = Formula::parse(&text).unwrap();

            let a = formula.expand(&df).unwrap().design_matrix(&df).unwrap();
            let b = formula.expand(&df).unwrap().design_matrix(&df).unwrap();
            prop_assert_eq!(&a.columns, &b.columns);
            prop_assert_eq!(a.values.ncols(), a.columns.len());
            prop_assert_eq!(a.values.nrows(), nrows);
        }
    }
}
