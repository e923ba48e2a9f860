// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard module library.
//!
//! A small catalog of module types with working algorithm bodies, enough
//! to build real networks in tests and demos.

use crate::algorithm::{Algorithm, AlgorithmError, AlgorithmInput, AlgorithmOutput};
use crate::datatype::{DenseMatrix, Field, Geometry, LatVolField, Matrix};
use crate::module::ModuleLookupInfo;
use crate::port::{PortDescription, PortType};
use crate::registry::{ModuleDescription, ModuleRegistry};
use crate::state::{ModuleState, Value};
use std::sync::Arc;

/// Build a registry populated with the standard module types.
pub fn standard_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();

    registry.register(
        ModuleDescription::new(
            ModuleLookupInfo::new("GridFlow", "NewField", "CreateLatVol"),
            Arc::new(|| Box::new(CreateLatVolAlgo)),
        )
        .with_output(PortDescription::new("LatVol", PortType::Field))
        .with_state_default("XSize", Value::Int(16))
        .with_state_default("YSize", Value::Int(16))
        .with_state_default("ZSize", Value::Int(16)),
    );

    registry.register(
        ModuleDescription::new(
            ModuleLookupInfo::new("GridFlow", "Visualization", "ShowField"),
            Arc::new(|| Box::new(ShowFieldAlgo)),
        )
        .with_input(PortDescription::new("Field", PortType::Field))
        .with_output(PortDescription::new("SceneGraph", PortType::Geometry)),
    );

    registry.register(
        ModuleDescription::new(
            ModuleLookupInfo::new("GridFlow", "Math", "CreateMatrix"),
            Arc::new(|| Box::new(CreateMatrixAlgo)),
        )
        .with_output(PortDescription::new("EnteredMatrix", PortType::Matrix))
        .with_state_default("Rows", Value::Int(2))
        .with_state_default("Cols", Value::Int(2))
        .with_state_default("Fill", Value::Double(0.0)),
    );

    registry.register(
        ModuleDescription::new(
            ModuleLookupInfo::new("GridFlow", "Math", "ReportMatrixInfo"),
            Arc::new(|| Box::new(ReportMatrixInfoAlgo)),
        )
        .with_input(PortDescription::new("InputMatrix", PortType::Matrix)),
    );

    registry.register(
        ModuleDescription::new(
            ModuleLookupInfo::new("GridFlow", "Math", "AppendMatrix"),
            Arc::new(|| Box::new(AppendMatrixAlgo)),
        )
        .with_input(PortDescription::new("InputMatrices", PortType::Matrix).dynamic())
        .with_output(PortDescription::new("ResultMatrix", PortType::Matrix)),
    );

    registry.register(
        ModuleDescription::new(
            ModuleLookupInfo::new("GridFlow", "Math", "EvaluateLinearAlgebraBinary"),
            Arc::new(|| Box::new(BinaryAlgebraAlgo)),
        )
        .with_input(PortDescription::new("LHS", PortType::Matrix))
        .with_input(PortDescription::new("RHS", PortType::Matrix))
        .with_output(PortDescription::new("Result", PortType::Matrix))
        .with_state_default("Operator", Value::String("add".into())),
    );

    registry
}

fn state_usize(state: &ModuleState, name: &str) -> Result<usize, AlgorithmError> {
    state
        .get(name)
        .and_then(Value::as_int)
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| AlgorithmError::new(format!("state value {name} missing or negative")))
}

struct CreateLatVolAlgo;

impl Algorithm for CreateLatVolAlgo {
    fn run(
        &mut self,
        _input: &AlgorithmInput,
        state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let dims = [
            state_usize(state, "XSize")?,
            state_usize(state, "YSize")?,
            state_usize(state, "ZSize")?,
        ];
        let mut output = AlgorithmOutput::new();
        output.set_data("LatVol", LatVolField::zeros(dims));
        Ok(output)
    }
}

struct ShowFieldAlgo;

impl Algorithm for ShowFieldAlgo {
    fn run(
        &mut self,
        input: &AlgorithmInput,
        _state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let field = input
            .get_as::<Field>("Field")
            .ok_or_else(|| AlgorithmError::new("no field to show"))?;
        let mut output = AlgorithmOutput::new();
        output.set_data(
            "SceneGraph",
            Geometry {
                label: format!("field with {} values", field.num_values()),
            },
        );
        Ok(output)
    }
}

struct CreateMatrixAlgo;

impl Algorithm for CreateMatrixAlgo {
    fn run(
        &mut self,
        _input: &AlgorithmInput,
        state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let rows = state_usize(state, "Rows")?;
        let cols = state_usize(state, "Cols")?;
        let fill = state
            .get("Fill")
            .and_then(Value::as_double)
            .unwrap_or(0.0);
        let mut output = AlgorithmOutput::new();
        output.set_data("EnteredMatrix", DenseMatrix::filled(rows, cols, fill));
        Ok(output)
    }
}

struct ReportMatrixInfoAlgo;

impl Algorithm for ReportMatrixInfoAlgo {
    fn run(
        &mut self,
        input: &AlgorithmInput,
        state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let matrix = input
            .get_as::<Matrix>("InputMatrix")
            .ok_or_else(|| AlgorithmError::new("no matrix to report on"))?;
        state.set("Rows", Value::Int(matrix.rows() as i64));
        state.set("Cols", Value::Int(matrix.cols() as i64));
        Ok(AlgorithmOutput::new())
    }
}

struct AppendMatrixAlgo;

impl Algorithm for AppendMatrixAlgo {
    fn run(
        &mut self,
        input: &AlgorithmInput,
        _state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let handles = input.get_all("InputMatrices");
        if handles.is_empty() {
            return Err(AlgorithmError::new("no matrices to append"));
        }
        let mut result: Option<DenseMatrix> = None;
        for handle in handles {
            let dense = <DenseMatrix as crate::datatype::PortData>::downcast(handle)
                .ok_or_else(|| AlgorithmError::new("append supports dense matrices only"))?;
            match &mut result {
                None => result = Some(dense.clone()),
                Some(acc) => acc.append_rows(dense).map_err(AlgorithmError::new)?,
            }
        }
        let mut output = AlgorithmOutput::new();
        if let Some(result) = result {
            output.set_data("ResultMatrix", result);
        }
        Ok(output)
    }
}

struct BinaryAlgebraAlgo;

impl Algorithm for BinaryAlgebraAlgo {
    fn run(
        &mut self,
        input: &AlgorithmInput,
        state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        let lhs = input
            .get_as::<DenseMatrix>("LHS")
            .ok_or_else(|| AlgorithmError::new("LHS must be a dense matrix"))?;
        let rhs = input
            .get_as::<DenseMatrix>("RHS")
            .ok_or_else(|| AlgorithmError::new("RHS must be a dense matrix"))?;
        let op = state
            .get("Operator")
            .and_then(Value::as_str)
            .unwrap_or("add")
            .to_owned();

        let result = match op.as_str() {
            "add" => {
                if lhs.rows != rhs.rows || lhs.cols != rhs.cols {
                    return Err(AlgorithmError::new("dimension mismatch for add"));
                }
                DenseMatrix {
                    rows: lhs.rows,
                    cols: lhs.cols,
                    values: lhs
                        .values
                        .iter()
                        .zip(&rhs.values)
                        .map(|(a, b)| a + b)
                        .collect(),
                }
            }
            "multiply" => {
                if lhs.cols != rhs.rows {
                    return Err(AlgorithmError::new("dimension mismatch for multiply"));
                }
                let mut out = DenseMatrix::zeros(lhs.rows, rhs.cols);
                for i in 0..lhs.rows {
                    for j in 0..rhs.cols {
                        let mut sum = 0.0;
                        for k in 0..lhs.cols {
                            sum += lhs.values[i * lhs.cols + k] * rhs.values[k * rhs.cols + j];
                        }
                        out.values[i * out.cols + j] = sum;
                    }
                }
                out
            }
            other => return Err(AlgorithmError::new(format!("unknown operator: {other}"))),
        };

        let mut output = AlgorithmOutput::new();
        output.set_data("Result", result);
        Ok(output)
    }
}
