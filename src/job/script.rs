//! Submission script rendering.
//!
//! Templates are plain shell scripts with placeholder tokens such as
//! `_NODES_` or `_BINARY_`. Tokens without a value are left untouched.

use serde::{Deserialize, Serialize};

use crate::job::package::PackageSelection;
use crate::job::resources::ResourceProfile;

pub const MPI_TEMPLATE: &str = "submit_mpi.sh";
pub const NOMPI_TEMPLATE: &str = "submit_nompi.sh";

/// Script parameters that are not derived from the resource table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSettings {
    pub job_name: String,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    pub output: String,
    #[serde(default)]
    pub preoption: Option<String>,
    #[serde(default)]
    pub postoption: Option<String>,
    /// Feed the input file through stdin rather than as an argument
    #[serde(default = "default_true")]
    pub input_redirect: bool,
    #[serde(default)]
    pub nompi: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            job_name: "job".to_string(),
            budget: None,
            input: None,
            output: "out.o".to_string(),
            preoption: None,
            postoption: None,
            input_redirect: true,
            nompi: false,
        }
    }
}

impl ScriptSettings {
    pub fn template_name(&self) -> &'static str {
        if self.nompi {
            NOMPI_TEMPLATE
        } else {
            MPI_TEMPLATE
        }
    }
}

fn replace(text: String, token: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => text.replace(token, value),
        None => text,
    }
}

/// Substitutes every placeholder in `template`.
pub fn render(
    template: &str,
    resources: &ResourceProfile,
    package: &PackageSelection,
    settings: &ScriptSettings,
) -> String {
    let number = |v: Option<u32>| v.map(|n| n.to_string());
    let cores = resources.cores.to_string();
    let threads = resources.threads.to_string();

    let mut text = template.to_string();
    text = replace(text, "_NODES_", number(resources.nodes).as_deref());
    text = replace(text, "_CORES_PER_NODE_", number(resources.cores_per_node).as_deref());
    text = replace(text, "_MPI_PER_NODE_", number(resources.mpi_per_node).as_deref());
    text = replace(text, "_MAX_TIME_", resources.max_time.as_deref());
    text = replace(text, "_JOBNAME_", Some(&settings.job_name));
    text = replace(text, "_QUEUE_", resources.queue.as_deref());
    text = replace(text, "_OMP_NUM_THREADS_", Some(&threads));
    text = replace(text, "_NUM_CORES_", Some(&cores));
    text = replace(text, "_BUDGET_", settings.budget.as_deref());

    match &settings.input {
        None => text = text.replace(" < $INPUT", ""),
        Some(input) => {
            text = text.replace("_INPUT_", input);
            if !settings.input_redirect {
                text = text.replace(" < $INPUT", " $INPUT");
            }
        }
    }
    text = text.replace("_OUTPUT_", &settings.output);

    match &settings.preoption {
        None => text = text.replace("$PREOPTION", ""),
        Some(option) => text = text.replace("_PREOPTION_", &format!("\"{}\"", option)),
    }
    match &settings.postoption {
        None => text = text.replace("$POSTOPTION", ""),
        Some(option) => text = text.replace("_POSTOPTION_", &format!("\"{}\"", option)),
    }

    match &package.binary_root {
        None => text = text.replace("_BINARY_ROOT_/", ""),
        Some(root) => text = text.replace("_BINARY_ROOT_", root),
    }
    text.replace("_BINARY_", &package.binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
#!/bin/bash
#PBS -q _QUEUE_
#PBS -l select=_NODES_:ncpus=_CORES_PER_NODE_:mpiprocs=_MPI_PER_NODE_
#PBS -l walltime=_MAX_TIME_
#PBS -N _JOBNAME_
#PBS -W group_list=_BUDGET_
export OMP_NUM_THREADS=_OMP_NUM_THREADS_
INPUT=_INPUT_
OUTPUT=_OUTPUT_
PREOPTION=_PREOPTION_
POSTOPTION=_POSTOPTION_
mpirun -np _NUM_CORES_ $PREOPTION _BINARY_ROOT_/_BINARY_ $POSTOPTION < $INPUT > $OUTPUT
";

    fn resources() -> ResourceProfile {
        ResourceProfile {
            cores: 4,
            threads: 2,
            queue: Some("small".to_string()),
            nodes: Some(1),
            cores_per_node: Some(4),
            mpi_per_node: Some(2),
            max_job_run: Some(10),
            max_job_submit: Some(20),
            max_time: Some("24:00:00".to_string()),
        }
    }

    fn package(root: Option<&str>) -> PackageSelection {
        PackageSelection {
            package: "turborvb".to_string(),
            version: "1.0.0".to_string(),
            binary: "turborvb-mpi.x".to_string(),
            binary_root: root.map(str::to_string),
        }
    }

    #[test]
    fn test_full_substitution() {
        let settings = ScriptSettings {
            job_name: "h2".to_string(),
            budget: Some("grp01".to_string()),
            input: Some("datas.input".to_string()),
            preoption: Some("-v".to_string()),
            ..ScriptSettings::default()
        };
        let script = render(TEMPLATE, &resources(), &package(Some("/opt/t/bin")), &settings);

        assert!(script.contains("#PBS -q small\n"));
        assert!(script.contains("select=1:ncpus=4:mpiprocs=2\n"));
        assert!(script.contains("walltime=24:00:00\n"));
        assert!(script.contains("#PBS -N h2\n"));
        assert!(script.contains("group_list=grp01\n"));
        assert!(script.contains("OMP_NUM_THREADS=2\n"));
        assert!(script.contains("INPUT=datas.input\n"));
        assert!(script.contains("OUTPUT=out.o\n"));
        assert!(script.contains("PREOPTION=\"-v\"\n"));
        assert!(script.contains(
            "mpirun -np 4 $PREOPTION /opt/t/bin/turborvb-mpi.x  < $INPUT > $OUTPUT"
        ));
    }

    #[test]
    fn test_absent_values() {
        let script = render(
            TEMPLATE,
            &ResourceProfile::unscheduled(1, 1),
            &package(None),
            &ScriptSettings::default(),
        );

        // no scheduler data: tokens stay
        assert!(script.contains("#PBS -q _QUEUE_"));
        assert!(script.contains("group_list=_BUDGET_"));
        // no input: redirection removed, token kept
        assert!(script.contains("INPUT=_INPUT_"));
        assert!(script.contains("mpirun -np 1  turborvb-mpi.x  > $OUTPUT"));
    }

    #[test]
    fn test_input_without_redirect() {
        let settings = ScriptSettings {
            input: Some("in.dat".to_string()),
            input_redirect: false,
            postoption: Some("--fast".to_string()),
            ..ScriptSettings::default()
        };
        let script = render(TEMPLATE, &resources(), &package(None), &settings);
        assert!(script.contains("POSTOPTION=\"--fast\"\n"));
        assert!(script.contains("$POSTOPTION $INPUT > $OUTPUT"));
    }

    #[test]
    fn test_template_selection() {
        assert_eq!(ScriptSettings::default().template_name(), "submit_mpi.sh");
        let nompi = ScriptSettings {
            nompi: true,
            ..ScriptSettings::default()
        };
        assert_eq!(nompi.template_name(), "submit_nompi.sh");
    }
}
