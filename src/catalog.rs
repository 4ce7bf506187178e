//! Static catalog of trainable algorithms and their explanatory workflows.
//!
//! Each workflow is the script the playback sequencer walks through while a
//! result is on screen. Every registered workflow is non-empty and ends with
//! its evaluation phase. Unknown algorithm names resolve to an empty
//! workflow, which callers treat as "nothing to animate".

use serde::Serialize;

use crate::logging::{log, obj, v_str, Domain, Level};

/// One step of an algorithm workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowStep {
    pub title: &'static str,
    pub description: &'static str,
    pub icon_key: &'static str,
}

impl WorkflowStep {
    pub fn icon(&self) -> IconKind {
        IconKind::from_key(self.icon_key)
    }
}

pub type Workflow = &'static [WorkflowStep];

const fn step(title: &'static str, description: &'static str, icon_key: &'static str) -> WorkflowStep {
    WorkflowStep { title, description, icon_key }
}

/// What kind of task an algorithm can be trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Regression,
    Classification,
    /// Classifier or regressor, picked by the service from the target column.
    Both,
    Clustering,
}

impl TaskKind {
    /// Human label for the "technique" field.
    pub fn technique(&self) -> &'static str {
        match self {
            TaskKind::Regression => "regression",
            TaskKind::Classification => "classification",
            TaskKind::Both => "Classification / Regression",
            TaskKind::Clustering => "clustering",
        }
    }

    pub fn needs_target(&self) -> bool {
        !matches!(self, TaskKind::Clustering)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Algorithm {
    pub name: &'static str,
    pub kind: TaskKind,
    pub description: &'static str,
    pub glyph: &'static str,
    #[serde(skip)]
    pub workflow: Workflow,
}

// =============================================================================
// Workflows
// =============================================================================

const LINEAR_REGRESSION: &[WorkflowStep] = &[
    step("Initialize Model", "Initialize coefficients to zero", "init"),
    step("Calculate Loss", "Compute Mean Squared Error (MSE) loss function", "loss"),
    step("Compute Gradients", "Calculate partial derivatives for each feature", "gradient"),
    step("Update Weights", "Adjust coefficients using gradient descent", "weights"),
    step("Iterate", "Repeat until convergence or max iterations reached", "loop"),
    step("Predict", "Apply learned linear equation: y = mx + b", "predict"),
    step("Evaluate", "Calculate RMSE on test set", "evaluate"),
];

const LOGISTIC_REGRESSION: &[WorkflowStep] = &[
    step("Initialize Weights", "Start with random weights close to zero", "init"),
    step("Apply Sigmoid", "Transform linear output using sigmoid: 1/(1+e^-x)", "sigmoid"),
    step("Calculate Loss", "Use binary cross-entropy loss function", "loss"),
    step("Backpropagation", "Compute gradients using chain rule", "gradient"),
    step("Update Parameters", "Optimize weights via gradient descent", "weights"),
    step("Probability Threshold", "Classify based on 0.5 probability threshold", "threshold"),
    step("Evaluate", "Calculate accuracy and confusion matrix", "evaluate"),
];

const DECISION_TREE: &[WorkflowStep] = &[
    step("Root Node", "Select best feature with highest information gain", "root"),
    step("Split Data", "Partition data based on feature threshold", "split"),
    step("Child Nodes", "Recursively create nodes for subsets", "tree"),
    step("Stop Condition", "Stop when max depth/samples reached or pure", "stop"),
    step("Leaf Creation", "Assign class label to leaf nodes", "leaf"),
    step("Predictions", "Follow tree path from root to leaf", "predict"),
    step("Evaluate", "Measure accuracy on test data", "evaluate"),
];

const RANDOM_FOREST: &[WorkflowStep] = &[
    step("Bootstrap Samples", "Create multiple random samples with replacement", "boot"),
    step("Grow Trees", "Build decision trees for each bootstrap sample", "tree"),
    step("Feature Randomness", "Randomly select features at each split", "random"),
    step("Ensemble Creation", "Combine multiple independent trees", "ensemble"),
    step("Vote/Average", "Aggregate predictions from all trees", "aggregate"),
    step("Final Prediction", "Output majority class (classification) or mean (regression)", "predict"),
    step("Evaluate", "Calculate out-of-bag (OOB) error metrics", "evaluate"),
];

const SVM: &[WorkflowStep] = &[
    step("Feature Scaling", "Normalize features to same scale", "scale"),
    step("Kernel Selection", "Choose kernel (linear, RBF, polynomial, sigmoid)", "kernel"),
    step("Margin Calculation", "Find maximum margin between classes", "margin"),
    step("Support Vectors", "Identify critical data points near boundary", "vectors"),
    step("Hyperplane", "Determine optimal separating hyperplane", "plane"),
    step("Predictions", "Classify based on side of hyperplane", "predict"),
    step("Evaluate", "Measure accuracy and margins", "evaluate"),
];

const NAIVE_BAYES: &[WorkflowStep] = &[
    step("Calculate Prior", "Compute P(Class) for each class", "prior"),
    step("Class Features", "For each class, calculate feature probability", "feature"),
    step("Apply Bayes", "Use Bayes theorem: P(A|B) = P(B|A)*P(A)/P(B)", "bayes"),
    step("Conditional Independence", "Assume features are conditionally independent", "indep"),
    step("Compute Likelihood", "Calculate probability for each class given features", "likelihood"),
    step("Select Maximum", "Choose class with highest posterior probability", "predict"),
    step("Evaluate", "Calculate accuracy and classification metrics", "evaluate"),
];

const KNN: &[WorkflowStep] = &[
    step("Distance Metric", "Choose distance metric (Euclidean, Manhattan, etc.)", "distance"),
    step("K Value", "Select number of nearest neighbors (K)", "kvalue"),
    step("Compute Distances", "Calculate distance from test point to all training points", "calc"),
    step("Find Neighbors", "Identify K nearest points in feature space", "neighbors"),
    step("Majority Vote", "Count class labels of K neighbors", "vote"),
    step("Prediction", "Output most common class among neighbors", "predict"),
    step("Evaluate", "Measure accuracy and neighbors effectiveness", "evaluate"),
];

const K_MEANS: &[WorkflowStep] = &[
    step("Initialize Centroids", "Randomly place K cluster centers in feature space", "init"),
    step("Assign Points", "Assign each data point to nearest centroid", "assign"),
    step("Compute Centers", "Calculate mean of all points in each cluster", "calc"),
    step("Update Centroids", "Move centroids to computed cluster means", "update"),
    step("Check Convergence", "Stop if centroids no longer move significantly", "check"),
    step("Repeat", "Iterate assign-update cycle until convergence", "loop"),
    step("Evaluate", "Calculate silhouette score and cluster quality", "evaluate"),
];

const DBSCAN: &[WorkflowStep] = &[
    step("Set Parameters", "Choose epsilon (radius) and min_samples", "init"),
    step("Find Core Points", "Identify points with ≥ min_samples in epsilon radius", "core"),
    step("Form Clusters", "Connect core points within epsilon distance", "connect"),
    step("Add Border Points", "Include non-core points near clusters", "border"),
    step("Mark Noise", "Label outliers as noise (cluster -1)", "noise"),
    step("Density Check", "Validate cluster density meets threshold", "check"),
    step("Evaluate", "Calculate silhouette excluding noise points", "evaluate"),
];

const AGGLOMERATIVE: &[WorkflowStep] = &[
    step("Start Individual", "Treat each point as its own cluster", "init"),
    step("Compute Distances", "Calculate pairwise distances between all clusters", "calc"),
    step("Find Closest Pair", "Identify two closest clusters to merge", "closest"),
    step("Merge Clusters", "Combine closest pair into single cluster", "merge"),
    step("Update Distances", "Recalculate distances for merged cluster", "update"),
    step("Build Dendrogram", "Create hierarchical tree of merges", "tree"),
    step("Cut Tree", "Slice dendrogram at desired cluster count", "evaluate"),
];

// =============================================================================
// Algorithm registry
// =============================================================================

pub const ALGORITHMS: &[Algorithm] = &[
    Algorithm { name: "Linear Regression", kind: TaskKind::Regression, description: "Predict continuous values using a line.", glyph: "📈", workflow: LINEAR_REGRESSION },
    Algorithm { name: "Logistic Regression", kind: TaskKind::Classification, description: "Binary classification using sigmoid.", glyph: "🎯", workflow: LOGISTIC_REGRESSION },
    Algorithm { name: "Decision Tree", kind: TaskKind::Both, description: "Flowchart-like structure for decisions.", glyph: "🌳", workflow: DECISION_TREE },
    Algorithm { name: "Random Forest", kind: TaskKind::Both, description: "Ensemble of multiple decision trees.", glyph: "🌲", workflow: RANDOM_FOREST },
    Algorithm { name: "SVM", kind: TaskKind::Both, description: "Finding optimal hyperplanes.", glyph: "⚡", workflow: SVM },
    Algorithm { name: "Naive Bayes", kind: TaskKind::Classification, description: "Probabilistic classifier based on Bayes theorem.", glyph: "🎲", workflow: NAIVE_BAYES },
    Algorithm { name: "KNN", kind: TaskKind::Both, description: "Clustering based on neighbor proximity.", glyph: "🔮", workflow: KNN },
    Algorithm { name: "K-Means Clustering", kind: TaskKind::Clustering, description: "Partition data into centroid-based clusters.", glyph: "🧭", workflow: K_MEANS },
    Algorithm { name: "DBSCAN", kind: TaskKind::Clustering, description: "Density-based clusters that find noise.", glyph: "🌀", workflow: DBSCAN },
    Algorithm { name: "Agglomerative Clustering", kind: TaskKind::Clustering, description: "Bottom-up hierarchical grouping.", glyph: "🪜", workflow: AGGLOMERATIVE },
];

/// Registry entry for an exact algorithm name.
pub fn algorithm(name: &str) -> Option<&'static Algorithm> {
    ALGORITHMS.iter().find(|a| a.name == name)
}

/// Workflow for an algorithm; empty for names the catalog does not know.
pub fn lookup(name: &str) -> Workflow {
    match algorithm(name) {
        Some(a) => a.workflow,
        None => {
            log(Level::Debug, Domain::Catalog, "unknown_algorithm", obj(&[("algorithm", v_str(name))]));
            &[]
        }
    }
}

// =============================================================================
// Icons
// =============================================================================

/// Rendering variant for a step's icon key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    Init,
    Loss,
    Gradient,
    Weights,
    Loop,
    Sigmoid,
    Threshold,
    Root,
    Split,
    Tree,
    Stop,
    Leaf,
    Bootstrap,
    Random,
    Ensemble,
    Aggregate,
    Scale,
    Kernel,
    Margin,
    Vectors,
    Plane,
    Prior,
    Feature,
    Bayes,
    Independence,
    Likelihood,
    Distance,
    KValue,
    Calc,
    Neighbors,
    Vote,
    Predict,
    Evaluate,
    Assign,
    Update,
    Check,
    Core,
    Connect,
    Border,
    Noise,
    Closest,
    Merge,
    /// Fallback for keys with no dedicated icon.
    Generic,
}

const ICON_KEYS: &[(&str, IconKind)] = &[
    ("init", IconKind::Init),
    ("loss", IconKind::Loss),
    ("gradient", IconKind::Gradient),
    ("weights", IconKind::Weights),
    ("loop", IconKind::Loop),
    ("sigmoid", IconKind::Sigmoid),
    ("threshold", IconKind::Threshold),
    ("root", IconKind::Root),
    ("split", IconKind::Split),
    ("tree", IconKind::Tree),
    ("stop", IconKind::Stop),
    ("leaf", IconKind::Leaf),
    ("boot", IconKind::Bootstrap),
    ("random", IconKind::Random),
    ("ensemble", IconKind::Ensemble),
    ("aggregate", IconKind::Aggregate),
    ("scale", IconKind::Scale),
    ("kernel", IconKind::Kernel),
    ("margin", IconKind::Margin),
    ("vectors", IconKind::Vectors),
    ("plane", IconKind::Plane),
    ("prior", IconKind::Prior),
    ("feature", IconKind::Feature),
    ("bayes", IconKind::Bayes),
    ("indep", IconKind::Independence),
    ("likelihood", IconKind::Likelihood),
    ("distance", IconKind::Distance),
    ("kvalue", IconKind::KValue),
    ("calc", IconKind::Calc),
    ("neighbors", IconKind::Neighbors),
    ("vote", IconKind::Vote),
    ("predict", IconKind::Predict),
    ("evaluate", IconKind::Evaluate),
    ("assign", IconKind::Assign),
    ("update", IconKind::Update),
    ("check", IconKind::Check),
    ("core", IconKind::Core),
    ("connect", IconKind::Connect),
    ("border", IconKind::Border),
    ("noise", IconKind::Noise),
    ("closest", IconKind::Closest),
    ("merge", IconKind::Merge),
];

impl IconKind {
    pub fn from_key(key: &str) -> Self {
        ICON_KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, kind)| *kind)
            .unwrap_or(IconKind::Generic)
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            IconKind::Init | IconKind::Weights => "⚡",
            IconKind::Loss | IconKind::Likelihood | IconKind::Predict => "📈",
            IconKind::Gradient => "▦",
            IconKind::Loop | IconKind::Update => "🔄",
            IconKind::Sigmoid => "⟿",
            IconKind::Threshold | IconKind::Assign => "🎯",
            IconKind::Root => "🌳",
            IconKind::Split => "🔀",
            IconKind::Tree => "🌲",
            IconKind::Stop => "⛔",
            IconKind::Leaf => "🍃",
            IconKind::Bootstrap | IconKind::KValue => "🎲",
            IconKind::Random => "🎰",
            IconKind::Ensemble | IconKind::Neighbors => "👥",
            IconKind::Scale | IconKind::Distance => "📏",
            IconKind::Kernel => "⚙️",
            IconKind::Margin => "📐",
            IconKind::Vectors => "➡️",
            IconKind::Plane => "✈️",
            IconKind::Feature | IconKind::Closest => "🔍",
            IconKind::Bayes | IconKind::Calc => "🧮",
            IconKind::Independence | IconKind::Connect | IconKind::Merge => "🔗",
            IconKind::Vote => "🗳️",
            IconKind::Check => "✅",
            IconKind::Core => "⭐",
            IconKind::Border => "🔵",
            IconKind::Noise => "❌",
            IconKind::Aggregate | IconKind::Prior | IconKind::Evaluate | IconKind::Generic => "📊",
        }
    }
}
