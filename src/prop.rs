//! Thermophysical property evaluation with propagated uncertainty.
//!
//! The property library itself is an external collaborator hidden behind
//! [`PropertyBackend`]; this adapter validates the named arguments, converts
//! them to the units the library expects, evaluates the property, and
//! differentiates it by central differences so the result carries the
//! uncertainty of every uncertain input.

use crate::measurement::Measurement;
use crate::registry::AffineMap;
use crate::unit::Unit;
use crate::value::Value;
use crate::{Error, Result};

/// Relative perturbation used for the central differences.
const RELATIVE_STEP: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fluid {
    Water,
    Meg,
    Air,
}

impl Fluid {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "water" => Some(Fluid::Water),
            "MEG" => Some(Fluid::Meg),
            "air" => Some(Fluid::Air),
            _ => None,
        }
    }

    /// The argument names this fluid requires, in evaluation order.
    fn required_args(self) -> &'static [&'static str] {
        match self {
            Fluid::Water | Fluid::Air => &["t", "p"],
            Fluid::Meg => &["t", "p", "c"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// Density, `kg/m3`.
    Rho,
    /// Specific heat capacity, `J/kg-K`.
    Cp,
    /// Dynamic viscosity, `Pa-s`.
    Mu,
}

impl Property {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "rho" => Some(Property::Rho),
            "cp" => Some(Property::Cp),
            "mu" => Some(Property::Mu),
            _ => None,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Property::Rho => "kg/m3",
            Property::Cp => "J/kg-K",
            Property::Mu => "Pa-s",
        }
    }
}

/// The state a property is evaluated at, in the library's units: kelvin,
/// pascal, and a mass fraction for incompressible mixtures.
#[derive(Debug, Clone, Copy)]
pub struct PropertyState {
    pub temperature: f64,
    pub pressure: f64,
    pub concentration: Option<f64>,
}

/// The external property library, queried once per perturbation.
pub trait PropertyBackend {
    fn evaluate(&self, fluid: Fluid, property: Property, state: &PropertyState) -> Result<f64>;
}

/// Blanket implementation so a plain function can serve as a backend.
impl<F> PropertyBackend for F
where
    F: Fn(Fluid, Property, &PropertyState) -> Result<f64>,
{
    fn evaluate(&self, fluid: Fluid, property: Property, state: &PropertyState) -> Result<f64> {
        self(fluid, property, state)
    }
}

struct Argument<'a> {
    name: &'static str,
    measurement: &'a Measurement,
    /// Conversion from the argument's unit to the library's unit.
    map: AffineMap,
    /// Values in the library's unit, broadcast to the result length.
    si_values: Vec<f64>,
    uncerts: Vec<f64>,
}

fn library_unit(name: &str) -> &'static str {
    match name {
        "t" => "K",
        "p" => "Pa",
        _ => "1",
    }
}

/// Evaluate a property of a fluid at the state given by named measurement
/// arguments, with first-order uncertainty propagation by central
/// differences. Vector arguments dispatch the scalar path per index.
pub fn property(
    backend: &dyn PropertyBackend,
    property: Property,
    fluid: Fluid,
    args: &[(&str, &Measurement)],
) -> Result<Measurement> {
    let required = fluid.required_args();
    for (name, _) in args {
        if !required.iter().any(|r| r == name) {
            return Err(Error::UnexpectedArgument(name.to_string()));
        }
    }
    for (i, (name, _)) in args.iter().enumerate() {
        if args[..i].iter().any(|(other, _)| other == name) {
            return Err(Error::UnexpectedArgument(name.to_string()));
        }
    }

    // The result shape is the common shape of the vector arguments.
    let mut len: Option<usize> = None;
    for (_, m) in args {
        if let Some(l) = m.len() {
            match len {
                None => len = Some(l),
                Some(existing) if existing != l => {
                    return Err(Error::ShapeMismatch(format!(
                        "arguments have {existing} and {l} elements"
                    )))
                }
                Some(_) => {}
            }
        }
    }
    let points = len.unwrap_or(1);

    let mut arguments = Vec::with_capacity(required.len());
    for &name in required {
        let (_, measurement) = args
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or(Error::MissingArgument(name))?;
        let target = Unit::parse(library_unit(name))?;
        let map = measurement.unit().converter(&target)?;
        let si_values: Vec<f64> = measurement
            .value()
            .convert(map)
            .broadcast(points)?
            .to_vec();
        let uncerts: Vec<f64> = measurement.uncert().broadcast(points)?.to_vec();
        if name == "c" {
            for c in &si_values {
                if !(0.0 < *c && *c < 1.0) {
                    return Err(Error::InvalidArgument {
                        name: "c".to_string(),
                        reason: "the mass fraction must lie strictly between 0 and 1".to_string(),
                    });
                }
            }
        }
        arguments.push(Argument {
            name,
            measurement,
            map,
            si_values,
            uncerts,
        });
    }

    let state_at = |arguments: &[Argument], index: usize| -> PropertyState {
        let mut state = PropertyState {
            temperature: 0.0,
            pressure: 0.0,
            concentration: None,
        };
        for arg in arguments {
            let v = arg.si_values[index];
            match arg.name {
                "t" => state.temperature = v,
                "p" => state.pressure = v,
                _ => state.concentration = Some(v),
            }
        }
        state
    };

    let mut nominal = Vec::with_capacity(points);
    for i in 0..points {
        nominal.push(backend.evaluate(fluid, property, &state_at(&arguments, i))?);
    }

    // Central-difference partials per uncertain argument, mapped back to the
    // argument's own unit through the conversion scale.
    let mut grads: Vec<Vec<f64>> = Vec::with_capacity(arguments.len());
    for k in 0..arguments.len() {
        let mut grad = vec![0.0; points];
        if arguments[k].uncerts.iter().any(|u| *u != 0.0) {
            for i in 0..points {
                let v = arguments[k].si_values[i];
                let h = if v == 0.0 {
                    RELATIVE_STEP
                } else {
                    RELATIVE_STEP * v.abs()
                };
                let mut perturbed = arguments.iter().map(|a| a.si_values.clone()).collect::<Vec<_>>();
                perturbed[k][i] = v + h;
                let plus = evaluate_with(backend, fluid, property, &arguments, &perturbed, i)?;
                perturbed[k][i] = v - h;
                let minus = evaluate_with(backend, fluid, property, &arguments, &perturbed, i)?;
                grad[i] = (plus - minus) / (2.0 * h) * arguments[k].map.scale;
            }
        }
        grads.push(grad);
    }

    let value = if len.is_some() {
        Value::from(nominal)
    } else {
        Value::Scalar(nominal[0])
    };
    let operands: Vec<(&Measurement, Value)> = arguments
        .iter()
        .zip(grads)
        .map(|(arg, grad)| {
            let grad = if len.is_some() {
                Value::from(grad)
            } else {
                Value::Scalar(grad[0])
            };
            (arg.measurement, grad)
        })
        .collect();
    Measurement::derived(value, Unit::parse(property.unit())?, &operands)
}

fn evaluate_with(
    backend: &dyn PropertyBackend,
    fluid: Fluid,
    property: Property,
    arguments: &[Argument],
    values: &[Vec<f64>],
    index: usize,
) -> Result<f64> {
    let mut state = PropertyState {
        temperature: 0.0,
        pressure: 0.0,
        concentration: None,
    };
    for (arg, vals) in arguments.iter().zip(values) {
        match arg.name {
            "t" => state.temperature = vals[index],
            "p" => state.pressure = vals[index],
            _ => state.concentration = Some(vals[index]),
        }
    }
    backend.evaluate(fluid, property, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MOLAR_MASS: f64 = 0.029;
    const R: f64 = 8.314462618;

    /// An ideal-gas stand-in for the external library.
    fn ideal_gas(_fluid: Fluid, property: Property, state: &PropertyState) -> Result<f64> {
        match property {
            Property::Rho => Ok(state.pressure * MOLAR_MASS / (R * state.temperature)),
            Property::Cp => Ok(1005.0 + 0.02 * (state.temperature - 273.15)),
            Property::Mu => Ok(1.8e-5 * (state.temperature / 293.15).sqrt()),
        }
    }

    fn meg_backend(_fluid: Fluid, _property: Property, state: &PropertyState) -> Result<f64> {
        let c = state.concentration.expect("MEG carries a concentration");
        Ok(1000.0 + 120.0 * c - 0.3 * (state.temperature - 273.15))
    }

    #[test]
    fn test_density_with_uncertainty() {
        let t = Measurement::with_uncert(300.0, "K", 1.0).unwrap();
        let p = Measurement::with_uncert(101_325.0, "Pa", 100.0).unwrap();
        let rho = property(&ideal_gas, Property::Rho, Fluid::Air, &[("t", &t), ("p", &p)]).unwrap();

        let nominal = 101_325.0 * MOLAR_MASS / (R * 300.0);
        assert_relative_eq!(
            rho.value().as_scalar().unwrap(),
            nominal,
            max_relative = 1e-12
        );
        assert_eq!(rho.unit().to_string(), "kg/m3");

        // Analytic partials of P·M/(R·T).
        let d_dt = -nominal / 300.0;
        let d_dp = MOLAR_MASS / (R * 300.0);
        let expected = ((d_dt * 1.0).powi(2) + (d_dp * 100.0).powi(2)).sqrt();
        assert_relative_eq!(
            rho.uncert().as_scalar().unwrap(),
            expected,
            max_relative = 1e-4
        );
    }

    #[test]
    fn test_arguments_convert_to_library_units() {
        let t = Measurement::with_uncert(26.85, "C", 0.5).unwrap();
        let p = Measurement::new(1.01325, "bar").unwrap();
        let rho = property(&ideal_gas, Property::Rho, Fluid::Water, &[("t", &t), ("p", &p)]).unwrap();

        let nominal = 101_325.0 * MOLAR_MASS / (R * 300.0);
        assert_relative_eq!(
            rho.value().as_scalar().unwrap(),
            nominal,
            max_relative = 1e-9
        );
        // ∂ρ/∂T in celsius equals the kelvin partial; the scale is one.
        let d_dt = -nominal / 300.0;
        assert_relative_eq!(
            rho.uncert().as_scalar().unwrap(),
            (d_dt * 0.5).abs(),
            max_relative = 1e-4
        );
    }

    #[test]
    fn test_vector_dispatch() {
        let t = Measurement::with_uncert([290.0, 300.0, 310.0], "K", [1.0, 1.0, 1.0]).unwrap();
        let p = Measurement::new(101_325.0, "Pa").unwrap();
        let rho = property(&ideal_gas, Property::Rho, Fluid::Air, &[("t", &t), ("p", &p)]).unwrap();

        assert_eq!(rho.len(), Some(3));
        for (i, temperature) in [290.0, 300.0, 310.0].iter().enumerate() {
            let nominal = 101_325.0 * MOLAR_MASS / (R * temperature);
            assert_relative_eq!(rho.value().get(i).unwrap(), nominal, max_relative = 1e-12);
            assert_relative_eq!(
                rho.uncert().get(i).unwrap(),
                nominal / temperature,
                max_relative = 1e-4
            );
        }
    }

    #[test]
    fn test_concentration_validation() {
        let t = Measurement::new(300.0, "K").unwrap();
        let p = Measurement::new(1e5, "Pa").unwrap();

        let missing = property(&meg_backend, Property::Rho, Fluid::Meg, &[("t", &t), ("p", &p)]);
        assert!(matches!(missing, Err(Error::MissingArgument("c"))));

        let c = Measurement::new(1.4, "1").unwrap();
        let out_of_range = property(
            &meg_backend,
            Property::Rho,
            Fluid::Meg,
            &[("t", &t), ("p", &p), ("c", &c)],
        );
        assert!(matches!(out_of_range, Err(Error::InvalidArgument { .. })));

        let c = Measurement::with_uncert(0.4, "1", 0.01).unwrap();
        let rho = property(
            &meg_backend,
            Property::Rho,
            Fluid::Meg,
            &[("t", &t), ("p", &p), ("c", &c)],
        )
        .unwrap();
        assert_relative_eq!(
            rho.value().as_scalar().unwrap(),
            1000.0 + 120.0 * 0.4 - 0.3 * (300.0 - 273.15),
            max_relative = 1e-9
        );
        assert_relative_eq!(
            rho.uncert().as_scalar().unwrap(),
            120.0 * 0.01,
            max_relative = 1e-4
        );
    }

    #[test]
    fn test_unexpected_argument() {
        let t = Measurement::new(300.0, "K").unwrap();
        let p = Measurement::new(1e5, "Pa").unwrap();
        let c = Measurement::new(0.5, "1").unwrap();
        let result = property(
            &ideal_gas,
            Property::Rho,
            Fluid::Air,
            &[("t", &t), ("p", &p), ("c", &c)],
        );
        assert!(matches!(result, Err(Error::UnexpectedArgument(_))));
    }

    #[test]
    fn test_keys() {
        assert_eq!(Fluid::from_key("water"), Some(Fluid::Water));
        assert_eq!(Fluid::from_key("MEG"), Some(Fluid::Meg));
        assert_eq!(Fluid::from_key("steam"), None);
        assert_eq!(Property::from_key("mu"), Some(Property::Mu));
        assert_eq!(Property::from_key("rho"), Some(Property::Rho));
        assert_eq!(Property::from_key("h"), None);
    }
}
