use std::str::SplitWhitespace;

use pcd_core::pointcloud::decimation::{
    decimator::{
        ClassDecimator, DecimatorChain, FlagDecimator, PointCloudDecimator, PointFlag,
        RangeDecimator, ReturnDecimator, VoxelDecimator,
    },
    voxel_grid::VoxelGrid,
};

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    KeepClass(Vec<u8>),
    DropClass(Vec<u8>),
    DropWithheld,
    DropSynthetic,
    KeepFirst,
    KeepLast,
    KeepZ { min: f64, max: f64 },
    KeepXy { min: [f64; 2], max: [f64; 2] },
}

impl Criterion {
    fn decimator(&self) -> Box<dyn PointCloudDecimator> {
        match self {
            Criterion::KeepClass(classes) => Box::new(ClassDecimator {
                classes: classes.clone(),
                keep_listed: true,
            }),
            Criterion::DropClass(classes) => Box::new(ClassDecimator {
                classes: classes.clone(),
                keep_listed: false,
            }),
            Criterion::DropWithheld => Box::new(FlagDecimator {
                flag: PointFlag::Withheld,
            }),
            Criterion::DropSynthetic => Box::new(FlagDecimator {
                flag: PointFlag::Synthetic,
            }),
            Criterion::KeepFirst => Box::new(ReturnDecimator::First),
            Criterion::KeepLast => Box::new(ReturnDecimator::Last),
            Criterion::KeepZ { min, max } => Box::new(RangeDecimator::z(*min, *max)),
            Criterion::KeepXy { min, max } => {
                Box::new(RangeDecimator::xy(min[0], min[1], max[0], max[1]))
            }
        }
    }
}

/// Parsed filter expression, e.g. `-keep_class 2 6 -thin_with_voxel 0.5`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub criteria: Vec<Criterion>,
    pub voxel_size: Option<f64>,
}

struct Args<'a> {
    option: &'a str,
    tokens: std::iter::Peekable<SplitWhitespace<'a>>,
}

impl Args<'_> {
    fn number(&mut self) -> Result<f64, StreamError> {
        let token = self.tokens.next().ok_or_else(|| {
            StreamError::config(format!("filter option {} expects more values", self.option))
        })?;
        token.parse::<f64>().map_err(|_| {
            StreamError::config(format!(
                "filter option {} expects a number, got '{}'",
                self.option, token
            ))
        })
    }

    fn classes(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut classes = Vec::new();
        while let Some(token) = self.tokens.next_if(|t| !t.starts_with('-')) {
            let class = token.parse::<u8>().map_err(|_| {
                StreamError::config(format!(
                    "filter option {} expects classes in 0..=255, got '{}'",
                    self.option, token
                ))
            })?;
            classes.push(class);
        }
        if classes.is_empty() {
            return Err(StreamError::config(format!(
                "filter option {} expects at least one class",
                self.option
            )));
        }
        Ok(classes)
    }
}

impl FilterSpec {
    pub fn parse(expression: &str) -> Result<Self, StreamError> {
        let mut spec = FilterSpec::default();
        let mut tokens = expression.split_whitespace().peekable();

        while let Some(option) = tokens.next() {
            let mut args = Args { option, tokens };
            match option {
                "-thin_with_voxel" => {
                    let size = args.number()?;
                    if !size.is_finite() || size == 0.0 {
                        return Err(StreamError::config(format!(
                            "voxel size must be finite and non-zero, got {}",
                            size
                        )));
                    }
                    spec.voxel_size = Some(size.abs());
                }
                "-keep_class" => spec.criteria.push(Criterion::KeepClass(args.classes()?)),
                "-drop_class" => spec.criteria.push(Criterion::DropClass(args.classes()?)),
                "-drop_withheld" => spec.criteria.push(Criterion::DropWithheld),
                "-drop_synthetic" => spec.criteria.push(Criterion::DropSynthetic),
                "-keep_first" => spec.criteria.push(Criterion::KeepFirst),
                "-keep_last" => spec.criteria.push(Criterion::KeepLast),
                "-keep_z" => {
                    let (min, max) = (args.number()?, args.number()?);
                    spec.criteria.push(Criterion::KeepZ { min, max });
                }
                "-keep_xy" => {
                    let min = [args.number()?, args.number()?];
                    let max = [args.number()?, args.number()?];
                    spec.criteria.push(Criterion::KeepXy { min, max });
                }
                _ => {
                    return Err(StreamError::config(format!(
                        "unknown filter option '{}'",
                        option
                    )))
                }
            }
            tokens = args.tokens;
        }

        Ok(spec)
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty() && self.voxel_size.is_none()
    }

    /// Decimators for the criteria in order, with voxel thinning last so that
    /// dropped points never occupy a voxel.
    pub fn build(&self, voxel: Option<VoxelGrid>) -> DecimatorChain {
        let mut chain = DecimatorChain::new(self.criteria.iter().map(|c| c.decimator()).collect());
        if let Some(grid) = voxel {
            chain.push(Box::new(VoxelDecimator::new(grid)));
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcd_core::pointcloud::point::Point;

    fn make_point(x: f64, classification: u8) -> Point {
        let mut p = Point::new(x, 0.0, 0.0);
        p.attributes.classification = classification;
        p
    }

    #[test]
    fn parses_options_in_order() {
        let spec =
            FilterSpec::parse("-keep_class 2 6  -drop_withheld -keep_z -1.5 10 -thin_with_voxel -0.5")
                .unwrap();
        assert_eq!(
            spec.criteria,
            vec![
                Criterion::KeepClass(vec![2, 6]),
                Criterion::DropWithheld,
                Criterion::KeepZ {
                    min: -1.5,
                    max: 10.0
                },
            ]
        );
        assert_eq!(spec.voxel_size, Some(0.5));
        assert!(!spec.is_empty());
        assert!(FilterSpec::parse("  ").unwrap().is_empty());
    }

    #[test]
    fn malformed_expressions() {
        for expression in [
            "-keep_class",
            "-keep_class 300",
            "-keep_z 1",
            "-keep_xy 0 0 1 x",
            "-thin_with_voxel 0",
            "-thin_with_voxel nan",
            "-unknown",
            "keep_first",
        ] {
            assert!(
                matches!(FilterSpec::parse(expression), Err(StreamError::Config(_))),
                "{}",
                expression
            );
        }
    }

    #[test]
    fn voxel_runs_after_criteria() {
        let spec = FilterSpec::parse("-drop_class 7").unwrap();
        let grid = VoxelGrid::dynamic(1.0).unwrap();
        let mut chain = spec.build(Some(grid));
        assert_eq!(chain.names(), vec!["drop_class", "thin_with_voxel"]);

        // the dropped noise point must not claim the anchor cell
        let points = [make_point(0.1, 7), make_point(0.2, 2), make_point(0.3, 2)];
        let kept = chain.decimate(&points).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].x, 0.2);
    }
}
