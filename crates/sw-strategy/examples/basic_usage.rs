use sw_strategy::*;
use sw_types::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Stepwise Basic Usage Example");

    let space = SearchSpace::new()
        .add_float("learning_rate", 0.0, 1.0)
        .add_int("layers", 1, 6);
    let experiment = Experiment::new("basic_usage", space)
        .with_objective(Objective::new("accuracy", ObjectiveDirection::Maximize));

    // Five random trials, at least three observed, then Bayesian for ever.
    let mut strategy = GenerationStrategy::new(
        "Random+Bayesian",
        vec![
            GenerationStep::new(ModelKind::Random, 5).with_min_trials_observed(3),
            GenerationStep::new(ModelKind::Bayesian { exploration_weight: 0.3 }, -1)
                .with_max_parallelism(2),
        ],
    )?
    .with_seed(7);
    strategy.set_experiment(experiment)?;

    for (index, step) in strategy.steps().iter().enumerate() {
        println!("Step {index} ({}):", step.model());
        for criterion in step.transition_criteria() {
            println!("  {criterion}");
        }
    }

    let trials = strategy.gen_trials(5)?;
    println!("Generated {} trials from step {:?}", trials.len(), strategy.current_step_index());

    let experiment = strategy
        .experiment_mut()
        .ok_or("strategy has no experiment")?;
    for index in &trials[..3] {
        experiment.trial_mut(*index)?.mark_running().mark_completed();
        experiment.attach_row(MetricRow::new(*index, "accuracy", 0.5 + *index as f64 / 10.0, 0.01));
    }

    let advanced = strategy.maybe_advance(false)?;
    println!("Advanced: {advanced}, now on step {:?}", strategy.current_step_index());

    let run = strategy.gen(2)?;
    println!("{} proposed {} candidates", run.model_name, run.len());
    for candidate in &run.candidates {
        println!("  {candidate:?}");
    }

    println!("Example completed successfully!");
    Ok(())
}
