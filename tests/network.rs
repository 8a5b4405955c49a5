use nnfit::approx::assert_close;
use nnfit::core::*;
use nnfit::nn::*;
use nnfit::optimizers::{GradientDescent, Momentum};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Device, CommandQueue) {
    init_logging();
    let device = Device::host();
    let queue = CommandQueue::new(&device);
    (device, queue)
}

fn truth_table(device: &Device) -> [Vector; 4] {
    [
        Vector::from_slice(device, &[0.0f32, 0.0]),
        Vector::from_slice(device, &[1.0f32, 0.0]),
        Vector::from_slice(device, &[0.0f32, 1.0]),
        Vector::from_slice(device, &[1.0f32, 1.0]),
    ]
}

fn xor_data(device: &Device) -> SimpleDataset {
    SimpleDataset::new(
        Matrix::from_slice(device, 4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
        Matrix::from_slice(device, 4, 1, &[0.0, 1.0, 1.0, 0.0]),
    )
}

fn decisions(net: &mut Network, queue: &CommandQueue, inputs: &[Vector; 4]) -> [bool; 4] {
    let mut out = [false; 4];
    for (decision, input) in out.iter_mut().zip(inputs) {
        *decision = net.predict(queue, input).read::<f32>(queue)[0] > 0.5;
    }
    out
}

fn gate(device: &Device, queue: &CommandQueue, weights: [f32; 2], bias: f32) -> Network {
    let layer = Layer::new(device, 1, 2, TransferFunction::Sigmoid);
    layer.weights().write(queue, &weights);
    layer.biases().write(queue, &[bias]);
    let mut net = Network::new(device);
    net.input_layer(2).add(layer);
    net
}

#[test]
fn linear_layer_prediction() {
    let (device, queue) = setup();
    let ctx = NnContext::new(&device);
    let mut layer = Layer::new(&device, 2, 2, TransferFunction::Linear);
    layer.weights().write(&queue, &[1.0f32, 1.0, 2.0, 0.5]);
    layer.biases().write(&queue, &[0.0f32, 1.0]);
    let input = Vector::from_slice(&device, &[1.0f32, 2.0]);
    assert_eq!(layer.predict(&ctx, &queue, &input).read::<f32>(&queue), vec![3.0, 4.0]);
}

#[test]
fn logic_gates() {
    let (device, queue) = setup();
    let inputs = truth_table(&device);

    let mut or = gate(&device, &queue, [20.0, 20.0], -10.0);
    assert_eq!(decisions(&mut or, &queue, &inputs), [false, true, true, true]);

    let mut and = gate(&device, &queue, [10.0, 10.0], -10.0);
    assert_eq!(decisions(&mut and, &queue, &inputs), [false, false, false, true]);
}

#[test]
fn error_terms_flow_through_transposed_weights() {
    let (device, queue) = setup();
    let ctx = NnContext::new(&device);
    let mut upper = Layer::new(&device, 2, 3, TransferFunction::Sigmoid);
    upper.weights().write(&queue, &[2.0f32, 3.0, 4.0, 1.0, 2.0, 3.0]);
    upper.error_term().write(&queue, &[2.5f32, 0.75]);
    let ones = Vector::from_slice(&device, &[1.0f32, 1.0]);
    upper.backpropagate(&ctx, &queue, &ones, true);

    let mut lower = Layer::new(&device, 3, 1, TransferFunction::Sigmoid);
    lower.error_term().write(&queue, &[1.0f32, 1.0, 1.0]);
    lower.backpropagate(&ctx, &queue, upper.error_output(), false);
    assert_eq!(lower.error_term().read::<f32>(&queue), vec![5.75, 9.0, 12.25]);
}

#[test]
fn xor_with_three_sigmoid_hidden_units() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::new(&device, 3, 2, TransferFunction::Sigmoid))
        .add(Layer::new(&device, 1, 3, TransferFunction::Sigmoid));
    net.init(&queue, 12);

    let mut errors = Vec::new();
    {
        let mut optimizer = GradientDescent::new(&device, 3.0);
        let mut trainer = Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1);
        trainer.after_iteration(|_, _, error| errors.push(error));
        trainer.gradient_descent(&mut optimizer, 300);
    }

    assert_eq!(errors.len(), 300);
    for (i, pair) in errors.windows(2).enumerate() {
        assert!(pair[1] <= pair[0] + 1e-6, "error rose at iteration {}: {pair:?}", i + 1);
    }
    assert!(errors[299] < errors[0]);
    let inputs = truth_table(&device);
    assert_eq!(decisions(&mut net, &queue, &inputs), [false, true, true, false]);
}

#[test]
fn xor_with_sigmoid_hidden_layer() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::new(&device, 8, 2, TransferFunction::Sigmoid))
        .add(Layer::new(&device, 1, 8, TransferFunction::Sigmoid));
    net.init(&queue, 12);

    let mut errors = Vec::new();
    {
        let mut optimizer = GradientDescent::new(&device, 3.0);
        let mut trainer = Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1);
        trainer.after_iteration(|_, batch, error| {
            assert_eq!(batch, 0);
            errors.push(error);
        });
        trainer.gradient_descent(&mut optimizer, 1000);
    }

    assert_eq!(errors.len(), 1000);
    for (i, pair) in errors.windows(2).enumerate() {
        assert!(pair[1] <= pair[0] + 1e-4, "error rose at iteration {}: {pair:?}", i + 1);
    }
    let inputs = truth_table(&device);
    assert_eq!(decisions(&mut net, &queue, &inputs), [false, true, true, false]);
}

#[test]
fn xor_with_relu_hidden_layer_and_cross_entropy() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::new(&device, 16, 2, TransferFunction::RectifiedLinearUnit))
        .add(Layer::new(&device, 1, 16, TransferFunction::Sigmoid));
    net.init(&queue, 12);

    let mut optimizer = GradientDescent::new(&device, 0.5);
    Trainer::new(&queue, &mut net, &CrossEntropy, &data, 1).gradient_descent(&mut optimizer, 1000);

    let inputs = truth_table(&device);
    assert_eq!(decisions(&mut net, &queue, &inputs), [false, true, true, false]);
}

#[test]
fn parallelized_training_matches_sequential() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let build = |parallelization| {
        let mut net = Network::new(&device);
        net.input_layer(2)
            .add(Layer::parallelized(&device, 3, 2, TransferFunction::Tanh, parallelization))
            .add(Layer::parallelized(&device, 1, 3, TransferFunction::Sigmoid, parallelization));
        net.init(&queue, 4);
        net
    };
    let mut sequential = build(1);
    let mut batched = build(2);
    for (net, parallelization) in [(&mut sequential, 1), (&mut batched, 2)] {
        let mut optimizer = GradientDescent::new(&device, 1.0);
        Trainer::new(&queue, net, &MeanSquaredError, &data, parallelization).gradient_descent(&mut optimizer, 5);
    }
    let a = sequential.weights_and_gradients();
    let b = batched.weights_and_gradients();
    assert_eq!(a.len(), b.len());
    for ((wa, _), (wb, _)) in a.iter().zip(&b) {
        assert_close(&wb.read::<f32>(&queue), &wa.read::<f32>(&queue));
    }
}

#[test]
#[should_panic(expected = "do not split into groups")]
fn trainer_rejects_partial_groups() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::parallelized(&device, 1, 2, TransferFunction::Sigmoid, 3));
    let _ = Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 3);
}

#[test]
fn mini_batches_step_once_per_batch() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::new(&device, 1, 2, TransferFunction::Sigmoid));
    net.init(&queue, 1);

    let mut calls = Vec::new();
    {
        let mut optimizer = GradientDescent::new(&device, 0.5);
        let mut trainer = Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1);
        trainer
            .reshuffle_indices(7)
            .after_iteration(|iteration, batch, _| calls.push((iteration, batch)));
        trainer.mini_batch_gradient_descent(&mut optimizer, 3, 2);
    }
    assert_eq!(calls, vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]);
}

#[test]
fn shuffled_training_is_reproducible() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let train = || {
        let mut net = Network::new(&device);
        net.input_layer(2)
            .add(Layer::new(&device, 3, 2, TransferFunction::Sigmoid))
            .add(Layer::new(&device, 1, 3, TransferFunction::Sigmoid));
        net.init(&queue, 9);
        let mut optimizer = GradientDescent::new(&device, 1.0);
        Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1)
            .reshuffle_indices(3)
            .mini_batch_gradient_descent(&mut optimizer, 10, 1);
        net.weights_and_gradients()
            .iter()
            .map(|(w, _)| w.read::<f32>(&queue))
            .collect::<Vec<_>>()
    };
    assert_eq!(train(), train());
}

#[test]
fn momentum_lowers_the_error() {
    let (device, queue) = setup();
    let data = SimpleDataset::new(
        Matrix::from_slice(&device, 4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
        Matrix::from_slice(&device, 4, 1, &[0.0, 1.0, 1.0, 1.0]),
    );
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::new(&device, 1, 2, TransferFunction::Sigmoid));
    net.init(&queue, 2);

    let mut errors = Vec::new();
    let mut optimizer = Momentum::new(&device, 1.0, 0.9);
    {
        let mut trainer = Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1);
        trainer.after_iteration(|_, _, error| errors.push(error));
        trainer.gradient_descent(&mut optimizer, 200);
    }
    assert_eq!(optimizer.velocities().len(), 2);
    let (first, last) = (errors[0], errors[errors.len() - 1]);
    assert!(last < first / 2.0, "error went from {first} to {last}");
}

#[test]
fn classification_accuracy_counts_matching_labels() {
    let (device, queue) = setup();
    let inputs = [1.0, 0.0, 0.0, 1.0, 0.2, 0.9, 0.7, 0.1, 0.3, 0.4];
    for parallelization in [1, 2, 3] {
        let data = SimpleDataset::new(
            Matrix::from_slice(&device, 5, 2, &inputs),
            Matrix::new(&device, 5, 2),
        )
        .with_labels(Vector::from_slice(&device, &[0u16, 1, 0, 0, 1]));
        let layer = Layer::parallelized(&device, 2, 2, TransferFunction::Linear, parallelization);
        layer.weights().identity(&queue);
        let mut net = Network::new(&device);
        net.input_layer(2).add(layer);

        // argmax: 0, 1, 1, 0, 1
        let result = ClassificationEvaluator::evaluate(&queue, &mut net, &data, parallelization);
        assert_eq!(result, EvaluationResult { count: 5, correct: 4 });
        assert_eq!(result.accuracy(), 0.8);
    }
}

#[test]
fn dropout_keeps_the_requested_fraction() {
    let (device, queue) = setup();
    let ctx = NnContext::new(&device);
    let size = 10_000;
    let mut dropout = DropoutLayer::new(&device, &queue, size, 0.8, 1, 21);
    let x = Vector::zeroed(&device, size);
    x.fill(&queue, 1.0);
    let output = dropout.feedforward(&ctx, &queue, &x).read::<f32>(&queue);

    let kept = output.iter().filter(|&&v| v != 0.0).count();
    let fraction = kept as f32 / size as f32;
    assert!((fraction - 0.8).abs() < 0.02, "kept {fraction}");
    assert!(output.iter().all(|&v| v == 0.0 || (v - 1.25).abs() < 1e-6));
    let mean = output.iter().sum::<f32>() / size as f32;
    assert!((mean - 1.0).abs() < 0.05, "mean {mean}");
}

#[test]
fn dropout_below_a_trainable_layer() {
    let (device, queue) = setup();
    let data = xor_data(&device);
    let mut net = Network::new(&device);
    net.input_layer(2)
        .add(Layer::new(&device, 4, 2, TransferFunction::Sigmoid))
        .add(DropoutLayer::new(&device, &queue, 4, 0.9, 1, 5))
        .add(Layer::new(&device, 1, 4, TransferFunction::Sigmoid));
    net.init(&queue, 3);
    assert_eq!(net.backpropagate_until(), 0);
    assert_eq!(net.weights_and_gradients().len(), 4);

    let mut optimizer = GradientDescent::new(&device, 1.0);
    Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1).gradient_descent(&mut optimizer, 20);
    let y = net.predict(&queue, &truth_table(&device)[0]).read::<f32>(&queue);
    assert!(y[0].is_finite());
}

#[test]
fn random_initialization_returns_its_seed() {
    let (device, queue) = setup();
    let mut net = Network::new(&device);
    net.input_layer(3)
        .add(Layer::new(&device, 2, 3, TransferFunction::Tanh));
    let seed = net.init_random(&queue);
    let first = net.weights_and_gradients()[0].0.read::<f32>(&queue);
    net.init(&queue, seed);
    assert_eq!(net.weights_and_gradients()[0].0.read::<f32>(&queue), first);

    net.tune_with(1);
    let layer = net.last_layer().expect("one layer");
    assert_eq!(layer.output_size(), 2);
}
