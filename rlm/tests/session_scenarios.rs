//! End-to-end session tests driven through the public `complete` entry point.
//!
//! Every test scripts the model with `ScriptedCompletion`, so replies are
//! consumed in call order across the top-level session and any sub-queries.

use std::rc::Rc;

use rlm::core::types::Role;
use rlm::test_support::ScriptedCompletion;
use rlm::{CompleteOptions, MaxIterationsReachedError, complete};

fn options(max_iterations: u32) -> CompleteOptions {
    CompleteOptions {
        max_iterations,
        ..CompleteOptions::default()
    }
}

fn user_prompt(completion: &ScriptedCompletion, call: usize) -> String {
    let recorded = completion.recorded();
    let message = &recorded[call][1];
    assert_eq!(message.role, Role::User);
    message.content.clone()
}

#[test]
fn immediate_return_answers_the_query() {
    let completion = Rc::new(ScriptedCompletion::new(["return 2 + 2"]));
    let answer = complete("what is 2+2?", &options(10), completion.clone()).expect("answer");

    assert_eq!(answer, "4");
    assert_eq!(completion.calls(), 1);
    assert!(user_prompt(&completion, 0).contains("what is 2+2?"));
}

#[test]
fn printed_steps_feed_the_next_prompt() {
    let completion = Rc::new(ScriptedCompletion::new([
        "print('step 1')",
        "print('step 2')",
        "return 'done'",
    ]));
    let answer = complete("q", &options(3), completion.clone()).expect("answer");

    assert_eq!(answer, "\"done\"");
    assert_eq!(completion.calls(), 3);

    let last = user_prompt(&completion, 2);
    let first = last.find("step 1").expect("step 1 output");
    let second = last.find("step 2").expect("step 2 output");
    assert!(first < second);
    assert!(last.contains("Iterations remaining: 1."));
}

#[test]
fn endless_printing_exhausts_after_exactly_max_iterations_calls() {
    let completion = Rc::new(ScriptedCompletion::repeating("print('loop')"));
    let err = complete("q", &options(5), completion.clone()).unwrap_err();

    let limit = err
        .downcast_ref::<MaxIterationsReachedError>()
        .expect("max iterations error");
    assert_eq!(limit.max_iterations, 5);
    assert_eq!(completion.calls(), 5);
}

#[test]
fn fault_text_reaches_the_retry_prompt() {
    let completion = Rc::new(ScriptedCompletion::new([
        "error('intentional')",
        "return 'recovered'",
    ]));
    let answer = complete("q", &options(2), completion.clone()).expect("answer");

    assert_eq!(answer, "\"recovered\"");
    let retry = user_prompt(&completion, 1);
    assert!(retry.contains("error('intentional')"));
    assert!(retry.contains("runtime error"));
    assert!(retry.contains("intentional"));
}

#[test]
fn fault_on_the_last_iteration_is_still_max_iterations() {
    let completion = Rc::new(ScriptedCompletion::new(["print('a')", "error('late')"]));
    let err = complete("q", &options(2), completion.clone()).unwrap_err();
    assert!(err.downcast_ref::<MaxIterationsReachedError>().is_some());
}

#[test]
fn denied_capability_is_reported_to_the_model() {
    let completion = Rc::new(ScriptedCompletion::new([
        "os.execute('ls')",
        "return 'ok'",
    ]));
    let answer = complete("q", &options(3), completion.clone()).expect("answer");

    assert_eq!(answer, "\"ok\"");
    assert!(user_prompt(&completion, 1).contains("'os.execute' is not available in this sandbox"));
}

#[test]
fn context_is_visible_to_scripts() {
    let completion = Rc::new(ScriptedCompletion::new([
        "local n = 0 for _ in context:gmatch('ERROR') do n = n + 1 end return n",
    ]));
    let options = CompleteOptions {
        context: "ok\nERROR a\nok\nERROR b\n".to_string(),
        ..options(3)
    };
    assert_eq!(complete("count errors", &options, completion).expect("answer"), "2");
}

#[test]
fn sub_query_answers_about_its_own_context() {
    let completion = Rc::new(ScriptedCompletion::new([
        "local a, e = llm_query('how long?', 'abcdef') return a",
        "return #context",
    ]));
    let answer = complete("q", &options(3), completion.clone()).expect("answer");

    assert_eq!(answer, "\"6\"");
    assert_eq!(completion.calls(), 2);
    assert!(user_prompt(&completion, 1).contains("how long?"));
}

#[test]
fn sub_query_is_refused_at_depth_one() {
    let completion = Rc::new(ScriptedCompletion::new([
        "local a, e = llm_query('inner') return e",
    ]));
    let options = CompleteOptions {
        max_depth: 1,
        ..options(3)
    };
    let answer = complete("q", &options, completion.clone()).expect("answer");

    assert_eq!(answer, "\"max recursion depth reached\"");
    assert_eq!(completion.calls(), 1);
}

#[test]
fn oversized_sub_query_gets_chunking_advice() {
    let completion = Rc::new(ScriptedCompletion::new([
        "local a, e = llm_query('q', context) return e",
    ]));
    let options = CompleteOptions {
        context: "x".repeat(100),
        max_context_chars: Some(50),
        ..options(3)
    };
    let answer = complete("q", &options, completion.clone()).expect("answer");

    assert!(answer.contains("exceeds the max_context_chars limit of 50"));
    assert!(answer.contains("at most 25 chars"));
    assert_eq!(completion.calls(), 1);
}

#[test]
fn child_exhaustion_does_not_end_the_parent() {
    // Parent reply, then two child passes that never return, then the parent recovers.
    let completion = Rc::new(ScriptedCompletion::new([
        "local a, e = llm_query('inner') print(e)",
        "print('child 1')",
        "print('child 2')",
        "return 'parent done'",
    ]));
    let answer = complete("q", &options(2), completion.clone()).expect("answer");

    assert_eq!(answer, "\"parent done\"");
    assert_eq!(completion.calls(), 4);
    assert!(user_prompt(&completion, 3).contains("max number of iterations reached"));
}

#[test]
fn child_sessions_do_not_share_globals_or_output() {
    let completion = Rc::new(ScriptedCompletion::new([
        "secret = 1 local a = llm_query('inner') print('parent saw ' .. a)",
        "print('child noise') return secret == nil",
        "return 'finished'",
    ]));
    complete("q", &options(3), completion.clone()).expect("answer");

    let parent_retry = user_prompt(&completion, 2);
    assert!(parent_retry.contains("parent saw true"));
    assert!(!parent_retry.contains("child noise"));
}

#[test]
fn completion_errors_propagate() {
    let completion = Rc::new(ScriptedCompletion::new(["print('one')"]));
    let err = complete("q", &options(3), completion.clone()).unwrap_err();

    assert!(err.downcast_ref::<MaxIterationsReachedError>().is_none());
    assert!(format!("{err:#}").contains("scripted completion exhausted"));
    assert_eq!(completion.calls(), 2);
}
